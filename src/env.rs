use crate::resolver::SearchPath;
use std::collections::BTreeMap;
use std::fmt;

/// Target hosts for dispatched functions.
pub const HOSTS: &str = "hosts";
/// Remote user name.
pub const USER: &str = "user";
/// Identity file used to reach the hosts.
pub const KEY_FILENAME: &str = "key_filename";
/// Active log levels; containing `debug` switches the session to debug mode.
pub const LOGLEVEL: &str = "loglevel";
/// Force changes.
pub const FORCE: &str = "force";
/// Whether functions may act on several hosts at once.
pub const PARALLEL: &str = "parallel";
/// Cloud region templates operate on.
pub const EC2_REGION: &str = "ec2_region";

/// Prefix of the variables exported to template functions.
pub const EXPORT_PREFIX: &str = "MICO_";

/// A value stored in the session environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    Bool(bool),
    List(Vec<String>),
}

impl Value {
    /// Parse the right-hand side of `set KEY=VALUE`.
    ///
    /// `true`/`false` in any case become booleans, everything else is kept as a string.
    pub fn parse_literal(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("true") {
            Value::Bool(true)
        } else if raw.eq_ignore_ascii_case("false") {
            Value::Bool(false)
        } else {
            Value::Str(raw.to_string())
        }
    }

    /// Membership test; a plain string behaves as a one-element list.
    pub fn contains(&self, item: &str) -> bool {
        match self {
            Value::Str(s) => s == item,
            Value::List(items) => items.iter().any(|x| x == item),
            Value::Bool(_) => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Bool(b) => write!(f, "{}", b),
            Value::List(items) => f.write_str(&items.join(",")),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<String>> for Value {
    fn from(items: Vec<String>) -> Self {
        Value::List(items)
    }
}

/// Session state handed to every built-in and template function.
///
/// The environment contains:
/// - `vars`: the open key/value mapping mutated by `set`, `host` and the startup flags.
/// - `search_path`: the ordered directories probed when resolving templates.
/// - `should_exit`: a flag the command loop checks to know when to terminate.
///
/// Nothing here outlives the process.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    /// Session variables, kept in key order.
    pub vars: BTreeMap<String, Value>,
    /// Template search path; grows as templates are resolved.
    pub search_path: SearchPath,
    /// When set to true, indicates that the command loop should exit.
    pub should_exit: bool,
}

impl Environment {
    /// Create an empty session over the given search path.
    pub fn new(search_path: SearchPath) -> Self {
        Self {
            vars: BTreeMap::new(),
            search_path,
            should_exit: false,
        }
    }

    pub fn get_var(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    /// Set or override a session variable.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<Value>) {
        self.vars.insert(key.into(), val.into());
    }

    /// Hosts targeted by dispatched functions, in the order they were given.
    pub fn hosts(&self) -> Vec<String> {
        match self.get_var(HOSTS) {
            Some(Value::List(hosts)) => hosts.clone(),
            Some(Value::Str(host)) if !host.is_empty() => vec![host.clone()],
            _ => Vec::new(),
        }
    }

    /// Add a level to `loglevel`, turning a scalar value into a list.
    pub fn add_loglevel(&mut self, level: &str) {
        let mut levels = match self.vars.remove(LOGLEVEL) {
            Some(Value::List(levels)) => levels,
            Some(Value::Str(level)) if !level.is_empty() => vec![level],
            _ => Vec::new(),
        };
        if !levels.iter().any(|l| l == level) {
            levels.push(level.to_string());
        }
        self.vars.insert(LOGLEVEL.to_string(), Value::List(levels));
    }

    /// Debug mode lets unexpected errors escape the command loop.
    pub fn is_debug(&self) -> bool {
        self.get_var(LOGLEVEL).is_some_and(|v| v.contains("debug"))
    }

    /// Session variables as `MICO_*` pairs for a child process.
    pub fn exported_vars(&self) -> Vec<(String, String)> {
        self.vars
            .iter()
            .map(|(k, v)| (export_name(k), v.to_string()))
            .collect()
    }
}

/// Name under which a session variable is exported: `ec2_region` -> `MICO_EC2_REGION`.
pub fn export_name(key: &str) -> String {
    let mut name = String::from(EXPORT_PREFIX);
    name.extend(key.chars().map(|c| {
        if c.is_ascii_alphanumeric() {
            c.to_ascii_uppercase()
        } else {
            '_'
        }
    }));
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_literal_booleans_ignore_case() {
        assert_eq!(Value::parse_literal("true"), Value::Bool(true));
        assert_eq!(Value::parse_literal("TRUE"), Value::Bool(true));
        assert_eq!(Value::parse_literal("False"), Value::Bool(false));
        assert_eq!(Value::parse_literal("bar"), Value::Str("bar".into()));
        assert_eq!(Value::parse_literal("truth"), Value::Str("truth".into()));
    }

    #[test]
    fn test_env_set_and_get_var() {
        let mut env = Environment::default();

        // initially absent
        assert_eq!(env.get_var("foo"), None);

        env.set_var("foo", "bar");

        assert_eq!(env.get_var("foo"), Some(&Value::Str("bar".into())));
    }

    #[test]
    fn test_hosts_accepts_list_or_single_string() {
        let mut env = Environment::default();
        assert!(env.hosts().is_empty());

        env.set_var(HOSTS, "web1");
        assert_eq!(env.hosts(), vec!["web1".to_string()]);

        env.set_var(HOSTS, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(env.hosts(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_debug_mode_follows_loglevel() {
        let mut env = Environment::default();
        assert!(!env.is_debug());

        env.set_var(LOGLEVEL, "info");
        env.add_loglevel("debug");
        assert!(env.is_debug());
        assert_eq!(
            env.get_var(LOGLEVEL),
            Some(&Value::List(vec!["info".into(), "debug".into()]))
        );

        // adding twice keeps a single entry
        env.add_loglevel("debug");
        assert_eq!(env.get_var(LOGLEVEL).map(|v| v.to_string()), Some("info,debug".into()));
    }

    #[test]
    fn test_exported_vars_are_prefixed_and_rendered() {
        let mut env = Environment::default();
        env.set_var(EC2_REGION, "eu-west-1");
        env.set_var(FORCE, true);
        env.set_var("my-key", vec!["x".to_string(), "y".to_string()]);

        let exported = env.exported_vars();
        assert_eq!(
            exported,
            vec![
                ("MICO_EC2_REGION".to_string(), "eu-west-1".to_string()),
                ("MICO_FORCE".to_string(), "true".to_string()),
                ("MICO_MY_KEY".to_string(), "x,y".to_string()),
            ]
        );
    }
}

//! Mapping `module[:function]` invocations to template functions.
//!
//! A template named `a.b` is looked up under each search path root, in order, as
//! the package `<root>/a/b/template.toml` and then as the single-file module
//! `<root>/a/b.toml`. The first match wins and shadowed entries are not reported.

use crate::env::Environment;
use crate::error::ResolveError;
use crate::template::{DEFAULT_FUNCTION, MANIFEST_FILE, Resolved, Template, TemplateFunction};
use log::debug;
use regex::Regex;
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Subdirectories of a resolved template that join the search path after it.
pub const AUXILIARY_DIRS: [&str; 5] = ["templates", "data", "content", "files", "sources"];

/// Extension of single-file templates.
const MODULE_EXTENSION: &str = "toml";

/// Guards discovery against runaway or cyclic directory trees.
const MAX_DEPTH: usize = 8;

static SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("segment pattern is valid")
});

/// Ordered list of directories probed when resolving templates.
///
/// Entries are never deduplicated; insertion order decides which of two
/// same-named templates is found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPath {
    dirs: Vec<PathBuf>,
}

impl SearchPath {
    pub fn new<I, P>(dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            dirs: dirs.into_iter().map(Into::into).collect(),
        }
    }

    pub fn push(&mut self, dir: impl Into<PathBuf>) {
        self.dirs.push(dir.into());
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PathBuf> {
        self.dirs.iter()
    }

    /// Directories in search order with repeats dropped.
    ///
    /// A repeated root can only yield names an earlier occurrence already
    /// provided, so walks over the path only need each root once.
    pub fn distinct(&self) -> Vec<&Path> {
        let mut seen = HashSet::new();
        self.dirs
            .iter()
            .map(PathBuf::as_path)
            .filter(|dir| seen.insert(*dir))
            .collect()
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    /// Append a template directory followed by its auxiliary subdirectories.
    pub fn extend_for(&mut self, dir: &Path) {
        self.dirs.push(dir.to_path_buf());
        for sub in AUXILIARY_DIRS {
            self.dirs.push(dir.join(sub));
        }
    }

    /// The search path as a platform path list, for child processes.
    pub fn joined(&self) -> OsString {
        std::env::join_paths(&self.dirs).unwrap_or_else(|err| {
            debug!("search path can't be exported: {}", err);
            OsString::new()
        })
    }
}

impl<'a> IntoIterator for &'a SearchPath {
    type Item = &'a PathBuf;
    type IntoIter = std::slice::Iter<'a, PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.dirs.iter()
    }
}

/// Split an invocation target into module and optional function name.
///
/// `ec2.as:ls` gives `("ec2.as", Some("ls"))`; an empty function part counts as none.
pub fn split_target(target: &str) -> (&str, Option<&str>) {
    match target.split_once(':') {
        Some((module, function)) if !function.is_empty() => (module, Some(function)),
        Some((module, _)) => (module, None),
        None => (target, None),
    }
}

fn is_segment(s: &str) -> bool {
    SEGMENT.is_match(s)
}

fn not_found(name: &str, cause: impl Into<String>) -> ResolveError {
    ResolveError::NotFound {
        name: name.to_string(),
        cause: cause.into(),
    }
}

/// True when one of the directories leading to a module already is a package.
fn within_package(root: &Path, segments: &[&str]) -> bool {
    let mut dir = root.to_path_buf();
    segments.iter().any(|segment| {
        dir.push(segment);
        dir.join(MANIFEST_FILE).is_file()
    })
}

/// Find and load the template called `name` on the search path.
pub fn locate(search_path: &SearchPath, name: &str) -> Result<Template, ResolveError> {
    let segments: Vec<&str> = name.split('.').collect();
    if let Some(bad) = segments.iter().find(|s| !is_segment(s)) {
        return Err(not_found(name, format!("invalid name segment '{}'", bad)));
    }
    let (last, parents) = segments
        .split_last()
        .ok_or_else(|| not_found(name, "empty name"))?;
    let relative: PathBuf = segments.iter().collect();

    for root in search_path {
        let package = root.join(&relative).join(MANIFEST_FILE);
        let module = root.join(&relative).with_extension(MODULE_EXTENSION);

        let manifest = if package.is_file() {
            package
        } else if *last != "template" && module.is_file() && !within_package(root, parents) {
            module
        } else {
            continue;
        };

        debug!("template '{}' found at {}", name, manifest.display());
        return Template::load(name, &manifest).map_err(|err| not_found(name, format!("{:#}", err)));
    }

    Err(not_found(name, "nothing matches on the search path"))
}

/// Resolve `module` and pick the first of `candidates` it declares.
///
/// When none is declared the error names the last candidate tried.
pub fn resolve(
    search_path: &SearchPath,
    module: &str,
    candidates: &[&str],
) -> Result<(Template, TemplateFunction), ResolveError> {
    let template = locate(search_path, module)?;

    let mut last = DEFAULT_FUNCTION;
    for candidate in candidates {
        if let Some(function) = template.function(candidate) {
            let function = function.clone();
            return Ok((template, function));
        }
        last = *candidate;
    }

    let declared: Vec<&str> = template.functions().map(|f| f.name.as_str()).collect();
    let cause = if declared.is_empty() {
        "template declares no functions".to_string()
    } else {
        format!("available functions: {}", declared.join(", "))
    };
    Err(ResolveError::AttributeMissing {
        function: last.to_string(),
        module: module.to_string(),
        cause,
    })
}

/// Resolve a tokenized invocation against the session.
///
/// The first token is the `module[:function]` target, the rest become the
/// function's arguments. A non-internal template extends the search path with its
/// own directory and [`AUXILIARY_DIRS`].
pub fn resolve_invocation(
    env: &mut Environment,
    tokens: Vec<String>,
) -> Result<Resolved, ResolveError> {
    let mut tokens = tokens.into_iter();
    let target = tokens.next().ok_or_else(|| not_found("", "empty invocation"))?;
    let (module, function) = split_target(&target);
    let candidates = [function.unwrap_or(DEFAULT_FUNCTION)];

    let (template, function) = resolve(&env.search_path, module, &candidates)?;
    if !template.is_internal() {
        env.search_path.extend_for(&template.dir);
        debug!(
            "search path extended from {} ({} entries)",
            template.dir.display(),
            env.search_path.len()
        );
    }

    Ok(Resolved {
        template,
        function,
        args: tokens.collect(),
    })
}

/// Every loadable template on the search path, first occurrence of a name wins.
pub fn discover(search_path: &SearchPath) -> Vec<Template> {
    let mut found = Vec::new();
    for root in search_path.distinct() {
        scan_namespace(root, "", 0, &mut found);
    }
    found
}

fn sorted_entries(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok().map(|e| e.path())).collect();
    paths.sort();
    paths
}

fn qualified(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn record(name: String, manifest: &Path, found: &mut Vec<Template>) {
    if found.iter().any(|t| t.name == name) {
        return;
    }
    match Template::load(&name, manifest) {
        Ok(template) => found.push(template),
        Err(err) => debug!("skipping {}: {:#}", manifest.display(), err),
    }
}

/// Plain directories: packages, single-file modules and nested namespaces.
fn scan_namespace(dir: &Path, prefix: &str, depth: usize, found: &mut Vec<Template>) {
    if depth > MAX_DEPTH {
        return;
    }
    for path in sorted_entries(dir) {
        if path.is_dir() {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !is_segment(name) {
                continue;
            }
            let full = qualified(prefix, name);
            let manifest = path.join(MANIFEST_FILE);
            if manifest.is_file() {
                record(full.clone(), &manifest, found);
                scan_package(&path, &full, depth + 1, found);
            } else {
                scan_namespace(&path, &full, depth + 1, found);
            }
        } else if path.extension().is_some_and(|ext| ext == MODULE_EXTENSION) {
            let Some(stem) = path.file_stem().and_then(|n| n.to_str()) else {
                continue;
            };
            if stem == "template" || !is_segment(stem) {
                continue;
            }
            record(qualified(prefix, stem), &path, found);
        }
    }
}

/// Inside a package only sub-packages are templates.
fn scan_package(dir: &Path, prefix: &str, depth: usize, found: &mut Vec<Template>) {
    if depth > MAX_DEPTH {
        return;
    }
    for path in sorted_entries(dir) {
        let manifest = path.join(MANIFEST_FILE);
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if path.is_dir() && is_segment(name) && manifest.is_file() {
            let full = qualified(prefix, name);
            record(full.clone(), &manifest, found);
            scan_package(&path, &full, depth + 1, found);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const MAIN_ONLY: &str = "[functions.main]\ndoc = \"entry\"\nrun = \"run.sh\"\n";

    fn write(path: &Path, text: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    fn package(root: &Path, rel: &str, text: &str) -> PathBuf {
        let dir = root.join(rel);
        write(&dir.join(MANIFEST_FILE), text);
        dir
    }

    #[test]
    fn test_split_target() {
        assert_eq!(split_target("ec2.as"), ("ec2.as", None));
        assert_eq!(split_target("ec2.as:ls"), ("ec2.as", Some("ls")));
        assert_eq!(split_target("m:"), ("m", None));
    }

    #[test]
    fn test_locate_package_and_module() {
        let root = tempfile::tempdir().unwrap();
        let dir = package(root.path(), "ec2/as", MAIN_ONLY);
        write(&root.path().join("db.toml"), MAIN_ONLY);

        let path = SearchPath::new([root.path()]);
        let t = locate(&path, "ec2.as").unwrap();
        assert_eq!(t.name, "ec2.as");
        assert_eq!(t.dir, dir);

        let t = locate(&path, "db").unwrap();
        assert_eq!(t.dir, root.path());
    }

    #[test]
    fn test_package_shadows_module_and_first_root_wins() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        write(&first.path().join("web.toml"), MAIN_ONLY);
        package(first.path(), "web", MAIN_ONLY);
        package(second.path(), "web", MAIN_ONLY);

        let path = SearchPath::new([first.path(), second.path()]);
        let t = locate(&path, "web").unwrap();
        assert_eq!(t.dir, first.path().join("web"));
    }

    #[test]
    fn test_nonexistent_module_is_not_found() {
        let root = tempfile::tempdir().unwrap();
        let path = SearchPath::new([root.path()]);
        let err = resolve(&path, "nonexistent_module", &["main"]).unwrap_err();
        match err {
            ResolveError::NotFound { name, .. } => assert_eq!(name, "nonexistent_module"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_invalid_names_are_not_found() {
        let root = tempfile::tempdir().unwrap();
        let path = SearchPath::new([root.path()]);
        for name in ["", "..", "a..b", "../etc", "a/b"] {
            assert!(matches!(
                locate(&path, name),
                Err(ResolveError::NotFound { .. })
            ));
        }
    }

    #[test]
    fn test_broken_manifest_is_not_found_with_cause() {
        let root = tempfile::tempdir().unwrap();
        package(root.path(), "bad", "functions = 3\n");
        let path = SearchPath::new([root.path()]);
        let err = locate(&path, "bad").unwrap_err();
        assert!(err.to_string().contains("invalid manifest"));
    }

    #[test]
    fn test_missing_function_names_function_and_module() {
        let root = tempfile::tempdir().unwrap();
        package(root.path(), "m", MAIN_ONLY);
        let path = SearchPath::new([root.path()]);

        let err = resolve(&path, "m", &["foo"]).unwrap_err();
        match err {
            ResolveError::AttributeMissing {
                function,
                module,
                cause,
            } => {
                assert_eq!(function, "foo");
                assert_eq!(module, "m");
                assert_eq!(cause, "available functions: main");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_candidates_are_tried_in_order() {
        let root = tempfile::tempdir().unwrap();
        package(root.path(), "m", MAIN_ONLY);
        let path = SearchPath::new([root.path()]);

        let (_, function) = resolve(&path, "m", &["foo", "main"]).unwrap();
        assert_eq!(function.name, "main");

        let err = resolve(&path, "m", &["foo", "bar"]).unwrap_err();
        assert!(err.to_string().contains("'bar'"));
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        package(root.path(), "m", MAIN_ONLY);
        let path = SearchPath::new([root.path()]);
        assert_eq!(
            resolve(&path, "m", &["main"]).unwrap(),
            resolve(&path, "m", &["main"]).unwrap()
        );
    }

    #[test]
    fn test_invocation_extends_search_path() {
        let root = tempfile::tempdir().unwrap();
        let dir = package(root.path(), "m", MAIN_ONLY);
        let mut env = Environment::new(SearchPath::new([root.path()]));

        let resolved =
            resolve_invocation(&mut env, vec!["m".into(), "a".into(), "b".into()]).unwrap();
        assert_eq!(resolved.function.name, "main");
        assert_eq!(resolved.args, vec!["a".to_string(), "b".to_string()]);

        let expected: Vec<PathBuf> = vec![
            root.path().to_path_buf(),
            dir.clone(),
            dir.join("templates"),
            dir.join("data"),
            dir.join("content"),
            dir.join("files"),
            dir.join("sources"),
        ];
        assert_eq!(env.search_path.dirs(), expected.as_slice());

        // no dedup on a second resolution
        resolve_invocation(&mut env, vec!["m:main".into()]).unwrap();
        assert_eq!(env.search_path.len(), 13);
    }

    #[test]
    fn test_internal_template_keeps_search_path() {
        let root = tempfile::tempdir().unwrap();
        package(root.path(), "_mico_core", MAIN_ONLY);
        let mut env = Environment::new(SearchPath::new([root.path()]));

        resolve_invocation(&mut env, vec!["_mico_core".into()]).unwrap();
        assert_eq!(env.search_path.len(), 1);
    }

    #[test]
    fn test_failed_invocation_keeps_search_path() {
        let root = tempfile::tempdir().unwrap();
        package(root.path(), "m", MAIN_ONLY);
        let mut env = Environment::new(SearchPath::new([root.path()]));

        assert!(resolve_invocation(&mut env, vec!["m:nope".into()]).is_err());
        assert!(resolve_invocation(&mut env, Vec::new()).is_err());
        assert_eq!(env.search_path.len(), 1);
    }

    #[test]
    fn test_auxiliary_dirs_become_resolvable() {
        let root = tempfile::tempdir().unwrap();
        let dir = package(root.path(), "m", MAIN_ONLY);
        write(&dir.join("templates").join("extra.toml"), MAIN_ONLY);
        let mut env = Environment::new(SearchPath::new([root.path()]));

        assert!(locate(&env.search_path, "extra").is_err());
        resolve_invocation(&mut env, vec!["m".into()]).unwrap();
        assert!(locate(&env.search_path, "extra").is_ok());
    }

    #[test]
    fn test_modules_inside_packages_are_ignored() {
        let root = tempfile::tempdir().unwrap();
        let dir = package(root.path(), "m", MAIN_ONLY);
        write(&dir.join("settings.toml"), MAIN_ONLY);
        let path = SearchPath::new([root.path()]);

        assert!(locate(&path, "m.settings").is_err());
    }

    #[test]
    fn test_discover_lists_packages_modules_and_namespaces() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let dir = package(first.path(), "ec2", "");
        package(&dir, "as", MAIN_ONLY);
        write(&dir.join("data").join("ignored.toml"), MAIN_ONLY);
        write(&first.path().join("cloud").join("dns.toml"), MAIN_ONLY);
        write(&first.path().join("web.toml"), MAIN_ONLY);
        write(&first.path().join("notes.toml"), "not = \"a manifest\"\n");
        write(&second.path().join("web.toml"), MAIN_ONLY);
        write(&second.path().join("zeta.toml"), MAIN_ONLY);

        let path = SearchPath::new([first.path(), second.path(), Path::new("/no/such/dir")]);
        let names: Vec<String> = discover(&path).into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["cloud.dns", "ec2", "ec2.as", "web", "zeta"]);
    }

    #[test]
    fn test_repeated_resolution_does_not_multiply_discovery_roots() {
        let root = tempfile::tempdir().unwrap();
        let dir = package(root.path(), "deploy", MAIN_ONLY);
        write(&dir.join("files").join("nested").join("extra.toml"), MAIN_ONLY);
        let mut env = Environment::new(SearchPath::new([root.path()]));

        resolve_invocation(&mut env, vec!["deploy".into()]).unwrap();
        let once = discover(&env.search_path);
        let distinct = env.search_path.distinct().len();

        for _ in 0..50 {
            resolve_invocation(&mut env, vec!["deploy".into()]).unwrap();
        }
        assert_eq!(env.search_path.len(), 1 + 51 * (1 + AUXILIARY_DIRS.len()));
        assert_eq!(env.search_path.distinct().len(), distinct);

        let names = |templates: Vec<Template>| -> Vec<String> {
            templates.into_iter().map(|t| t.name).collect()
        };
        assert_eq!(names(discover(&env.search_path)), names(once));
    }

    #[test]
    fn test_distinct_keeps_first_occurrence_order() {
        let path = SearchPath::new(["/b", "/a", "/b", "/c", "/a"]);
        assert_eq!(
            path.distinct(),
            vec![Path::new("/b"), Path::new("/a"), Path::new("/c")]
        );
    }
}

//! Failure taxonomy of the console.
//!
//! Syntax, not-found and attribute-missing failures are always turned into a
//! one-line report. Anything else is [`ConsoleError::Unexpected`] and may be
//! propagated when the session runs in debug mode.

use console::style;
use thiserror::Error;

/// Failure to turn a template invocation into a callable function.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No search path entry holds a template with this name.
    #[error("template '{name}' not found: {cause}.")]
    NotFound { name: String, cause: String },

    /// The template exists but declares none of the requested functions.
    #[error("function '{function}' not found in template '{module}': {cause}")]
    AttributeMissing {
        function: String,
        module: String,
        cause: String,
    },
}

/// Any failure raised while dispatching a single console line.
#[derive(Debug, Error)]
pub enum ConsoleError {
    /// Malformed built-in argument or unbalanced quoting.
    #[error("invalid syntax, {0}")]
    Syntax(String),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("unexpected error: {}: {:#}", error_class(.0), .0)]
    Unexpected(anyhow::Error),
}

impl ConsoleError {
    /// Classify an error coming back from a command, keeping typed failures typed.
    pub fn classify(err: anyhow::Error) -> Self {
        match err.downcast::<ConsoleError>() {
            Ok(console) => console,
            Err(err) => match err.downcast::<ResolveError>() {
                Ok(resolve) => ConsoleError::Resolve(resolve),
                Err(err) => ConsoleError::Unexpected(err),
            },
        }
    }

    /// Format the error as the single line shown to the user.
    pub fn report(&self) -> String {
        format!("{} {}", style("error:").red().bold().for_stderr(), self)
    }
}

/// Short name of the failure at the bottom of an error chain.
fn error_class(err: &anyhow::Error) -> &'static str {
    let root = err.root_cause();
    if root.is::<std::io::Error>() {
        "IoError"
    } else if root.is::<toml::de::Error>() {
        "ParseError"
    } else {
        "Error"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_classify_keeps_syntax_errors() {
        let err = anyhow::Error::new(ConsoleError::Syntax("required var=value".into()));
        let classified = ConsoleError::classify(err);
        assert!(matches!(classified, ConsoleError::Syntax(_)));
        assert_eq!(classified.to_string(), "invalid syntax, required var=value");
    }

    #[test]
    fn test_classify_wraps_resolve_errors() {
        let err = anyhow::Error::new(ResolveError::NotFound {
            name: "ghost".into(),
            cause: "nothing matches on the search path".into(),
        });
        let classified = ConsoleError::classify(err);
        assert!(matches!(
            classified,
            ConsoleError::Resolve(ResolveError::NotFound { .. })
        ));
        assert_eq!(
            classified.to_string(),
            "template 'ghost' not found: nothing matches on the search path."
        );
    }

    #[test]
    fn test_unexpected_names_the_root_cause_class() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = Err::<(), _>(io).context("spawning run.sh").unwrap_err();
        let classified = ConsoleError::classify(err);
        assert!(matches!(classified, ConsoleError::Unexpected(_)));
        assert_eq!(
            classified.to_string(),
            "unexpected error: IoError: spawning run.sh: denied"
        );
    }

    #[test]
    fn test_attribute_missing_names_function_and_module() {
        let err = ResolveError::AttributeMissing {
            function: "foo".into(),
            module: "m".into(),
            cause: "available functions: main".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("'foo'"));
        assert!(msg.contains("'m'"));
    }
}

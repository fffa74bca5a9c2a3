//! Templates: named bundles of callable functions described by a TOML manifest.
//!
//! A template is either a package directory holding a `template.toml`, or a
//! single `<name>.toml` file. Each function names a program to run:
//!
//! ```toml
//! description = "Manage autoscaling groups"
//!
//! [functions.main]
//! doc = "List groups matching the given globs"
//! run = "as.sh"
//! args = ["ls"]
//! ```

use crate::command::{ExecutableCommand, ExitCode};
use crate::env::Environment;
use crate::external::{self, ExternalCommand};
use anyhow::{Context, Result};
use log::debug;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Manifest file that turns a directory into a template package.
pub const MANIFEST_FILE: &str = "template.toml";
/// Function called when an invocation names none.
pub const DEFAULT_FUNCTION: &str = "main";
/// Templates whose name starts with this prefix ship with mico itself and never
/// extend the search path.
pub const INTERNAL_PREFIX: &str = "_mico_";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    functions: BTreeMap<String, TemplateFunction>,
}

/// A callable declared by a template.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateFunction {
    #[serde(skip)]
    pub name: String,
    /// Shown by `help`; undocumented functions are not listed.
    #[serde(default)]
    pub doc: Option<String>,
    /// Program to execute, relative to the template directory or looked up on `PATH`.
    pub run: String,
    /// Fixed arguments placed before the user's.
    #[serde(default)]
    pub args: Vec<String>,
}

/// A loaded template manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    /// Dotted name the template was found under, e.g. `ec2.as`.
    pub name: String,
    /// Directory holding the manifest.
    pub dir: PathBuf,
    pub description: Option<String>,
    functions: BTreeMap<String, TemplateFunction>,
}

impl Template {
    /// Read and parse the manifest at `manifest_path`.
    pub fn load(name: &str, manifest_path: &Path) -> Result<Self> {
        let text = fs::read_to_string(manifest_path)
            .with_context(|| format!("can't read {}", manifest_path.display()))?;
        let dir = manifest_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::parse(name, dir, &text)
            .with_context(|| format!("invalid manifest {}", manifest_path.display()))
    }

    /// Build a template from manifest text.
    pub fn parse(name: &str, dir: PathBuf, text: &str) -> Result<Self> {
        let manifest: Manifest = toml::from_str(text)?;
        let functions = manifest
            .functions
            .into_iter()
            .map(|(fname, mut function)| {
                function.name = fname.clone();
                (fname, function)
            })
            .collect();
        Ok(Self {
            name: name.to_string(),
            dir,
            description: manifest.description,
            functions,
        })
    }

    pub fn function(&self, name: &str) -> Option<&TemplateFunction> {
        self.functions.get(name)
    }

    /// Declared functions in name order.
    pub fn functions(&self) -> impl Iterator<Item = &TemplateFunction> {
        self.functions.values()
    }

    pub fn is_internal(&self) -> bool {
        self.name.starts_with(INTERNAL_PREFIX)
    }

    /// Run `function` with the user's `args`, once per target host.
    ///
    /// The first non-zero exit code wins; the remaining hosts still run.
    pub fn invoke(
        &self,
        function: &TemplateFunction,
        args: &[String],
        env: &Environment,
    ) -> Result<ExitCode> {
        let search_paths = std::env::var_os("PATH");
        let program = external::find_program(&self.dir, search_paths.as_deref(), &function.run)
            .with_context(|| {
                format!(
                    "program '{}' of {}:{} not found",
                    function.run, self.name, function.name
                )
            })?;

        let argv: Vec<OsString> = function
            .args
            .iter()
            .chain(args)
            .map(OsString::from)
            .collect();

        let command = ExternalCommand::new(program, argv)
            .envs(env.exported_vars())
            .env("MICO_TEMPLATE", &self.name)
            .env("MICO_TEMPLATE_DIR", &self.dir)
            .env("MICO_SEARCH_PATH", env.search_path.joined());

        let hosts = env.hosts();
        if hosts.is_empty() {
            return command.execute();
        }

        let mut status = 0;
        for host in hosts {
            debug!("running {}:{} on {}", self.name, function.name, host);
            let code = command.clone().env("MICO_HOST", &host).execute()?;
            if status == 0 {
                status = code;
            }
        }
        Ok(status)
    }
}

/// A template function bound to its arguments, ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub template: Template,
    pub function: TemplateFunction,
    pub args: Vec<String>,
}

impl ExecutableCommand for Resolved {
    fn execute(
        self: Box<Self>,
        _stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        self.template.invoke(&self.function, &self.args, env)
    }
}

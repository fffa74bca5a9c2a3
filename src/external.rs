use crate::command::ExitCode;
use anyhow::{Context, Result};
use log::debug;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

/// Program run on behalf of a template function.
///
/// The child inherits stdio and the parent environment; `envs` are added on top.
#[derive(Debug, Clone)]
pub struct ExternalCommand {
    program: PathBuf,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
}

impl ExternalCommand {
    pub fn new(program: PathBuf, args: Vec<OsString>) -> Self {
        Self {
            program,
            args,
            envs: Vec::new(),
        }
    }

    pub fn env(mut self, key: impl Into<OsString>, val: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), val.into()));
        self
    }

    pub fn envs<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<OsString>,
        V: Into<OsString>,
    {
        self.envs
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Spawn the program and wait for it.
    pub fn execute(&self) -> Result<ExitCode> {
        debug!("spawning {} {:?}", self.program.display(), self.args);
        let mut child = std::process::Command::new(&self.program)
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k.as_os_str(), v.as_os_str())))
            .spawn()
            .with_context(|| format!("can't spawn {}", self.program.display()))?;
        let exit_status = child.wait()?;
        match exit_status.code() {
            Some(x) => Ok(x),
            None => Ok(terminated_by_signal(exit_status)),
        }
    }
}

#[cfg(unix)]
fn terminated_by_signal(exit_status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = ExitStatusExt::signal(&exit_status) {
        128 + signal
    } else if ExitStatusExt::core_dumped(&exit_status) {
        255
    } else {
        -1
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_exit_status: ExitStatus) -> i32 {
    -1
}

/// Resolve the program a template function runs.
///
/// Behavior:
/// - Absolute path: returns it if it exists.
/// - Relative with multiple components (e.g., `bin/run` or `./run`): looked up in
///   `template_dir`.
/// - Single path component: `template_dir` first, then each directory in
///   `search_paths` (PATH), returning the first existing match.
/// - Empty name: returns `None`.
pub fn find_program(
    template_dir: &Path,
    search_paths: Option<&OsStr>,
    program: &str,
) -> Option<PathBuf> {
    let path = Path::new(program);
    if path.is_absolute() {
        return find_by_path(path).map(Path::to_path_buf);
    }

    let mut components = path.components();
    let first = components.next();
    let second = components.next();
    match (first, second) {
        // Empty name -> not found
        (None, _) => None,
        (Some(x), None) => find_by_path(&template_dir.join(path))
            .map(Path::to_path_buf)
            .or_else(|| search_paths.and_then(|paths| find_in_path(paths, x.as_os_str()))),
        _ => find_by_path(&template_dir.join(path)).map(Path::to_path_buf),
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    for dir in std::env::split_paths(search_paths) {
        let path = dir.join(cmd);
        if let Some(path) = find_by_path(&path) {
            return Some(path.to_owned());
        }
    }
    None
}

fn find_by_path(path: &Path) -> Option<&Path> {
    if path.is_file() { Some(path) } else { None }
}

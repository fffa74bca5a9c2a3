use crate::env::Environment;
use anyhow::Result;
use std::io::Write;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// Template functions report the exit code of the program they ran.
pub type ExitCode = i32;

/// Object-safe trait for anything the console can execute for one line.
///
/// This is implemented by built-ins via a blanket impl and by resolved template functions.
pub trait ExecutableCommand {
    /// Executes the command, writing console output to `stdout`.
    fn execute(self: Box<Self>, stdout: &mut dyn Write, env: &mut Environment)
    -> Result<ExitCode>;
}

/// Entry of the built-in registration table.
///
/// Returns `None` from [`CommandFactory::try_create`] when `name` is not the command
/// this factory builds.
pub trait CommandFactory {
    /// Name typed at the prompt.
    fn name(&self) -> &'static str;

    /// One-line description shown by `help`.
    fn description(&self) -> &'static str;

    /// Attempt to create a command instance for the provided name and arguments.
    fn try_create(&self, name: &str, args: &[&str]) -> Option<Box<dyn ExecutableCommand>>;
}

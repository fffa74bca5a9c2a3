use crate::command::{CommandFactory, ExecutableCommand, ExitCode};
use crate::env::{self, Environment, Value};
use crate::error::ConsoleError;
use crate::interpreter::Factory;
use crate::resolver;
use anyhow::Result;
use argh::{EarlyExit, FromArgs};
use console::style;
use log::debug;
use std::io::Write;
use std::path::Path;

/// Built-in commands known to the console at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in-process. The rest of the line reaches them untouched as a single
/// positional, see [`line_args`].
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "set" or "host".
    fn name() -> &'static str;

    /// One-line summary listed by `help`.
    fn description() -> &'static str;

    /// Executes the command against the session environment.
    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(
        self: Box<Self>,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        T::execute(*self, stdout, env)
    }
}

struct InvalidArgs {
    output: String,
    is_error: bool,
}

impl ExecutableCommand for InvalidArgs {
    fn execute(
        self: Box<Self>,
        stdout: &mut dyn Write,
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        let output = self.output.trim_end();
        if self.is_error {
            return Err(ConsoleError::Syntax(output.to_string()).into());
        }
        writeln!(stdout, "{}", output)?;
        Ok(0)
    }
}

/// Arguments handed to a builtin for the text following its name.
///
/// `--help` alone asks for usage; anything else is passed after `--` so that
/// leading dashes and inner whitespace survive argh.
pub(crate) fn line_args(rest: &str) -> Vec<&str> {
    match rest.trim() {
        "" => Vec::new(),
        "--help" => vec!["--help"],
        _ => vec!["--", rest.trim_start()],
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn name(&self) -> &'static str {
        T::name()
    }

    fn description(&self) -> &'static str {
        T::description()
    }

    fn try_create(&self, name: &str, args: &[&str]) -> Option<Box<dyn ExecutableCommand>> {
        if name == T::name() {
            Some(match T::from_args(&[name], args) {
                Ok(cmd) => Box::new(cmd),
                Err(EarlyExit { output, status }) => Box::new(InvalidArgs {
                    output,
                    is_error: status.is_err(),
                }),
            })
        } else {
            None
        }
    }
}

/// The registration table of built-in commands, in registration order.
pub(crate) fn registry() -> Vec<Box<dyn CommandFactory>> {
    vec![
        Box::new(Factory::<Set>::default()),
        Box::new(Factory::<Host>::default()),
        Box::new(Factory::<Env>::default()),
        Box::new(Factory::<Help>::default()),
        Box::new(Factory::<Exit>::default()),
    ]
}

#[derive(FromArgs)]
/// Set an environment variable, in the form variable=value.
pub struct Set {
    #[argh(positional)]
    /// assignment in the form KEY=VALUE.
    pub assignment: Option<String>,
}

impl BuiltinCommand for Set {
    fn name() -> &'static str {
        "set"
    }

    fn description() -> &'static str {
        "Set an environment variable, in the form variable=value."
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let line = self.assignment.unwrap_or_default();
        let Some((key, value)) = line.split_once('=') else {
            return Err(ConsoleError::Syntax("required var=value".into()).into());
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(ConsoleError::Syntax("variable name is empty".into()).into());
        }
        let value = Value::parse_literal(value.trim());
        debug!("set {} = {:?}", key, value);
        env.set_var(key, value);
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Set hosts where commands must run.
pub struct Host {
    #[argh(positional)]
    /// comma-separated host list, e.g. web1,web2.
    pub hosts: Option<String>,
}

impl BuiltinCommand for Host {
    fn name() -> &'static str {
        "host"
    }

    fn description() -> &'static str {
        "Set hosts where commands must run."
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let line = self.hosts.unwrap_or_default();
        if line.trim().is_empty() {
            return Ok(0);
        }
        let hosts: Vec<String> = line
            .split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(String::from)
            .collect();
        env.set_var(env::HOSTS, hosts);
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Print current environment.
pub struct Env {
    #[argh(positional)]
    /// whitespace-separated variables to print; all of them when omitted.
    pub keys: Option<String>,
}

impl BuiltinCommand for Env {
    fn name() -> &'static str {
        "env"
    }

    fn description() -> &'static str {
        "Print current environment."
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let keys: Vec<&str> = self
            .keys
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .collect();
        for (key, value) in &env.vars {
            if keys.is_empty() || keys.contains(&key.as_str()) {
                writeln!(stdout, "{:<20} = {}", key, value)?;
            }
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// List available commands with "help" or detailed help with "help cmd".
pub struct Help {
    #[argh(positional)]
    /// built-in command or template to describe.
    pub name: Option<String>,
}

impl BuiltinCommand for Help {
    fn name() -> &'static str {
        "help"
    }

    fn description() -> &'static str {
        "List available commands with \"help\" or detailed help with \"help cmd\"."
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let mut builtins = registry();
        builtins.sort_by_key(|b| b.name());

        let name = self.name.as_deref().map(str::trim);
        if let Some(name) = name {
            if let Some(builtin) = builtins.iter().find(|b| b.name() == name) {
                writeln!(stdout, "{}", builtin.description())?;
                return Ok(0);
            }
        } else {
            writeln!(stdout, "{}", style("internals").yellow().bold())?;
            writeln!(
                stdout,
                "Internal commands for mico which are implemented in mico itself."
            )?;
            writeln!(stdout)?;
            for builtin in &builtins {
                writeln!(stdout, "{:<15}{}", builtin.name(), builtin.description())?;
            }
            writeln!(stdout)?;
        }

        let roots = env
            .search_path
            .iter()
            .filter(|dir| dir.as_path() != Path::new("."))
            .cloned();
        let mut shown = 0;
        for template in resolver::discover(&resolver::SearchPath::new(roots)) {
            if name.is_some_and(|n| n != template.name) {
                continue;
            }
            shown += 1;
            writeln!(stdout, "{}", style(&template.name).yellow().bold())?;
            if let Some(description) = &template.description {
                writeln!(stdout, "{}", description)?;
            }
            writeln!(stdout)?;
            for function in template.functions() {
                if let Some(doc) = &function.doc {
                    writeln!(
                        stdout,
                        "{}",
                        style(format!("{}.{}", template.name, function.name)).bold()
                    )?;
                    writeln!(stdout, "    {}", doc)?;
                    writeln!(stdout)?;
                }
            }
        }

        match name {
            Some(name) if shown == 0 => writeln!(stdout, "*** No help on {}", name)?,
            _ => {}
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Exits the console, also works by pressing C-D.
pub struct Exit {
    #[argh(positional)]
    /// ignored.
    pub _rest: Option<String>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn description() -> &'static str {
        "Exits the console, also works by pressing C-D."
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        env.should_exit = true;
        Ok(0)
    }
}

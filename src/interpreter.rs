use crate::builtin;
use crate::command::{CommandFactory, ExecutableCommand, ExitCode};
use crate::completion::{self, ConsoleHelper};
use crate::env::Environment;
use crate::error::ConsoleError;
use crate::lexer;
use crate::resolver;
use log::debug;
use rustyline::Editor;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use std::io::Write;

/// Greeting printed when the interactive loop starts.
pub const INTRO: &str = "mico console: type 'help' to list commands, C-D to leave.";

/// Factory allows creating instances of ExecutableCommand.
///
/// Only supports the built-in commands defined in this crate.
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

/// The command loop: dispatches one line at a time to a built-in or a template.
///
/// The interpreter owns the session [`Environment`] and the registration table of
/// built-ins. Failures are reported on `stderr` and never end the loop, except
/// unexpected ones while the session is in debug mode.
///
/// Example
/// ```
/// use mico::Interpreter;
/// use mico::env::{Environment, Value};
/// let mut console = Interpreter::new(Environment::default());
/// console.onecmd("set region=eu-west-1").unwrap();
/// assert_eq!(console.env().get_var("region"), Some(&Value::Str("eu-west-1".into())));
/// ```
pub struct Interpreter {
    env: Environment,
    commands: Vec<Box<dyn CommandFactory>>,
    stdout: Box<dyn Write>,
    stderr: Box<dyn Write>,
}

impl Interpreter {
    /// Create a console over `env` with the default built-ins, printing to the
    /// process streams.
    pub fn new(env: Environment) -> Self {
        Self {
            env,
            commands: builtin::registry(),
            stdout: Box::new(std::io::stdout()),
            stderr: Box::new(std::io::stderr()),
        }
    }

    /// Redirect console output and error reports.
    pub fn with_output(mut self, stdout: Box<dyn Write>, stderr: Box<dyn Write>) -> Self {
        self.stdout = stdout;
        self.stderr = stderr;
        self
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    /// Names of the registered built-ins, sorted.
    pub fn builtin_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.commands.iter().map(|c| c.name()).collect();
        names.sort_unstable();
        names
    }

    /// Built-in names followed by the templates discoverable right now.
    pub fn candidates(&self) -> Vec<String> {
        let mut candidates: Vec<String> =
            self.builtin_names().into_iter().map(String::from).collect();
        for template in resolver::discover(&self.env.search_path) {
            if !candidates.contains(&template.name) {
                candidates.push(template.name);
            }
        }
        candidates
    }

    /// Return the `index`-th completion of `text`, or `None` once exhausted.
    pub fn complete(&self, text: &str, index: usize) -> Option<String> {
        completion::complete(&self.candidates(), text, index)
    }

    /// Execute one line and report any failure.
    ///
    /// Returns the command's exit code, 1 when an error was reported. Only an
    /// unexpected error in debug mode is returned as `Err`.
    pub fn onecmd(&mut self, line: &str) -> anyhow::Result<ExitCode> {
        match self.dispatch(line) {
            Ok(code) => Ok(code),
            Err(ConsoleError::Unexpected(err)) if self.env.is_debug() => Err(err),
            Err(err) => {
                self.report(&err);
                Ok(1)
            }
        }
    }

    /// Print a failure the way the console reports it.
    pub fn report(&mut self, err: &ConsoleError) {
        if let Err(io) = writeln!(self.stderr, "{}", err.report()) {
            debug!("can't write error report: {}", io);
        }
    }

    fn dispatch(&mut self, line: &str) -> Result<ExitCode, ConsoleError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(0);
        }

        let (head, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let args = builtin::line_args(rest);
        for factory in &self.commands {
            if let Some(cmd) = factory.try_create(head, &args) {
                return cmd
                    .execute(self.stdout.as_mut(), &mut self.env)
                    .map_err(ConsoleError::classify);
            }
        }

        let tokens =
            lexer::split_into_words(line).map_err(|e| ConsoleError::Syntax(e.to_string()))?;
        if tokens.is_empty() {
            return Ok(0);
        }
        let resolved = resolver::resolve_invocation(&mut self.env, tokens)?;
        debug!(
            "dispatching {}:{} with {:?}",
            resolved.template.name, resolved.function.name, resolved.args
        );
        Box::new(resolved)
            .execute(self.stdout.as_mut(), &mut self.env)
            .map_err(ConsoleError::classify)
    }

    /// Read-Eval-Print Loop until `exit`, end-of-input or an escaping error.
    pub fn repl(&mut self, prompt: &str) -> anyhow::Result<()> {
        let mut rl: Editor<ConsoleHelper, DefaultHistory> = Editor::new()?;
        rl.set_helper(Some(ConsoleHelper::default()));
        writeln!(self.stdout, "{}", INTRO)?;

        while !self.env.should_exit {
            let candidates = self.candidates();
            if let Some(helper) = rl.helper_mut() {
                helper.refresh(candidates);
            }

            match rl.readline(prompt) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        rl.add_history_entry(line.as_str())?;
                    }
                    self.onecmd(&line)?;
                }
                Err(ReadlineError::Interrupted) => {
                    writeln!(self.stdout, "^C")?;
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    writeln!(self.stdout)?;
                    break;
                }
                Err(err) => return Err(err.into()),
            }
        }

        Ok(())
    }
}

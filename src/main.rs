use argh::FromArgs;
use log::debug;
use mico::Interpreter;
use mico::command::ExitCode;
use mico::config::Config;
use mico::env::{self, Environment};
use mico::error::ConsoleError;
use std::path::PathBuf;
use std::process;

#[derive(FromArgs)]
/// mico: run templates against your hosts, interactively or one command at a time.
struct Args {
    #[argh(option, short = 'e')]
    /// set environment variable, in the form KEY=VALUE.
    env: Vec<String>,

    #[argh(option, short = 'H')]
    /// set host to target; a comma-separated list is accepted.
    host: Vec<String>,

    #[argh(option, short = 'R', default = "String::from(\"us-east-1\")")]
    /// set EC2 region to work on.
    region: String,

    #[argh(option, short = 'u')]
    /// set the user to use to connect to host.
    user: Option<String>,

    #[argh(option, short = 'i')]
    /// set the key to use to connect to host.
    identity_file: Option<String>,

    #[argh(switch, short = 'v')]
    /// be verbose; unexpected errors show their full cause chain.
    verbose: bool,

    #[argh(switch, short = 'f')]
    /// force changes.
    force: bool,

    #[argh(switch)]
    /// don't execute actions in parallel.
    no_parallel: bool,

    #[argh(option, short = 'p')]
    /// add a template directory in front of the search path.
    path: Vec<PathBuf>,

    #[argh(positional, greedy)]
    /// the template:function to execute or an internal command.
    template: Vec<String>,
}

fn init_logging(verbose: bool) {
    let level = if verbose { "mico=debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

/// Apply the startup flags to the session, in the order the console documents.
fn apply_args(console: &mut Interpreter, args: &Args) -> anyhow::Result<()> {
    for assignment in &args.env {
        console.onecmd(&format!("set {}", assignment))?;
    }
    for host in &args.host {
        console.onecmd(&format!("host {}", host))?;
    }

    let session = console.env_mut();
    if args.verbose {
        session.add_loglevel("debug");
    }
    if let Some(user) = &args.user {
        session.set_var(env::USER, user.as_str());
    }
    if let Some(identity_file) = &args.identity_file {
        session.set_var(env::KEY_FILENAME, identity_file.as_str());
    }
    session.set_var(env::FORCE, args.force);
    session.set_var(env::PARALLEL, !args.no_parallel);
    session.set_var(env::EC2_REGION, args.region.as_str());
    Ok(())
}

fn run(console: &mut Interpreter, args: &Args, prompt: &str) -> anyhow::Result<ExitCode> {
    apply_args(console, args)?;

    if args.template.is_empty() {
        console.repl(prompt)?;
        Ok(0)
    } else {
        let line = args.template.join(" ");
        debug!("running '{}' non-interactively", line);
        console.onecmd(&line)
    }
}

fn exit_code(code: ExitCode) -> process::ExitCode {
    process::ExitCode::from(u8::try_from(code).unwrap_or(1))
}

fn main() -> anyhow::Result<process::ExitCode> {
    let args: Args = argh::from_env();
    init_logging(args.verbose);

    let config = match Config::load(&args.path) {
        Ok(config) => config,
        Err(err) if args.verbose => return Err(err),
        Err(err) => {
            eprintln!("{}", ConsoleError::Unexpected(err).report());
            return Ok(process::ExitCode::FAILURE);
        }
    };
    debug!("search path: {:?}", config.search_path);

    let mut console = Interpreter::new(Environment::new(config.search_path));
    match run(&mut console, &args, &config.prompt) {
        Ok(code) => Ok(exit_code(code)),
        Err(err) if console.env().is_debug() => Err(err),
        Err(err) => {
            console.report(&ConsoleError::Unexpected(err));
            Ok(process::ExitCode::FAILURE)
        }
    }
}

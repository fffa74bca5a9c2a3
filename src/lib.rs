//! A console that dispatches typed commands to pluggable templates.
//!
//! A line typed at the `mico` prompt is either a built-in command (`set`, `host`,
//! `env`, `help`, `exit`) or a template invocation of the form
//! `name[:function] [args...]`. Templates are directories or TOML files found on an
//! ordered search path; their functions are external programs that receive the
//! session [`env::Environment`] through `MICO_*` variables.
//!
//! The main entry point is [`Interpreter`], which owns the session state and
//! executes one line at a time, either from an interactive [`rustyline`] loop or
//! from the process arguments.

mod builtin;
pub mod command;
pub mod completion;
pub mod config;
pub mod env;
pub mod error;
mod external;
mod interpreter;
pub mod io_adapters;
pub mod lexer;
pub mod resolver;
pub mod template;

/// Just a convenient re-export of the command loop.
///
/// See [`Interpreter`] for the high-level API.
pub use interpreter::Interpreter;
pub use io_adapters::MemWriter;

//! Tab completion over built-in command names and discoverable templates.

use rustyline::completion::Completer;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Helper};

/// Return the `index`-th candidate starting with `text`, or `None` once exhausted.
pub fn complete(candidates: &[String], text: &str, index: usize) -> Option<String> {
    candidates
        .iter()
        .filter(|c| c.starts_with(text))
        .nth(index)
        .cloned()
}

/// [`rustyline`] helper completing the word under the cursor.
///
/// The candidate list is a snapshot; the command loop refreshes it before every
/// prompt because resolving a template can make new templates discoverable.
#[derive(Debug, Default)]
pub struct ConsoleHelper {
    candidates: Vec<String>,
}

impl ConsoleHelper {
    pub fn refresh(&mut self, candidates: Vec<String>) {
        self.candidates = candidates;
    }
}

impl Completer for ConsoleHelper {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        let before = &line[..pos];
        let word = before.rsplit(char::is_whitespace).next().unwrap_or("");
        let start = pos - word.len();
        let matches = self
            .candidates
            .iter()
            .filter(|c| c.starts_with(word))
            .cloned()
            .collect();
        Ok((start, matches))
    }
}

impl Hinter for ConsoleHelper {
    type Hint = String;
}

impl Highlighter for ConsoleHelper {}

impl Validator for ConsoleHelper {}

impl Helper for ConsoleHelper {}

//! Word splitting for template invocations.
//!
//! Follows POSIX shell quoting (single quotes, double quotes, backslash escapes and
//! `#` comments) with a wider notion of word characters: besides letters, digits and
//! `_`, the characters `? * : / % & . - =` never break a word, so globs, paths,
//! `template:function` targets and `key=value` pairs survive unquoted. Any other
//! unquoted punctuation becomes a token of its own.

use thiserror::Error;

/// Characters that are part of a word in addition to alphanumerics and `_`.
pub const EXTRA_WORD_CHARS: &str = "?*:/%&.-=";

/// Errors that can occur during the lexical analysis process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexingError {
    /// A closing quote (single or double) was not found.
    #[error("no closing quotation")]
    UnfinishedQuote,
    /// The line ends with a backslash.
    #[error("no escaped character")]
    UnfinishedEscape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    Start,
    ReadingWord,
    ReadingSingleQuote,
    ReadingDoubleQuote,
}

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || EXTRA_WORD_CHARS.contains(ch)
}

struct LexingFSM {
    input: Vec<char>,
    pos: usize,
    state: LexingState,
    buffer: String,
    // Set once a quote opened the current word, so `''` still yields an empty word.
    quoted: bool,
}

impl LexingFSM {
    fn new(line: &str) -> Self {
        LexingFSM {
            input: line.chars().collect(),
            pos: 0,
            state: LexingState::Start,
            buffer: String::new(),
            quoted: false,
        }
    }

    /// Runs the machine over the whole input and returns the words found.
    fn make_words(&mut self) -> Result<Vec<String>, LexingError> {
        let mut out = Vec::new();

        while let Some(ch) = self.read_char() {
            match self.state {
                LexingState::Start => self.handle_start(ch, &mut out)?,
                LexingState::ReadingWord => self.handle_word(ch, &mut out)?,
                LexingState::ReadingSingleQuote => self.handle_single_quote(ch),
                LexingState::ReadingDoubleQuote => self.handle_double_quote(ch),
            }
        }

        match self.state {
            LexingState::ReadingSingleQuote | LexingState::ReadingDoubleQuote => {
                Err(LexingError::UnfinishedQuote)
            }
            _ => {
                self.finish_word(&mut out);
                Ok(out)
            }
        }
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn handle_start(&mut self, ch: char, out: &mut Vec<String>) -> Result<(), LexingError> {
        match ch {
            c if c.is_whitespace() => {}
            '#' => self.skip_comment(),
            '\'' => {
                self.quoted = true;
                self.state = LexingState::ReadingSingleQuote;
            }
            '"' => {
                self.quoted = true;
                self.state = LexingState::ReadingDoubleQuote;
            }
            '\\' => {
                self.read_escaped()?;
                self.state = LexingState::ReadingWord;
            }
            c if is_word_char(c) => {
                self.buffer.push(c);
                self.state = LexingState::ReadingWord;
            }
            c => out.push(c.to_string()),
        }
        Ok(())
    }

    fn handle_word(&mut self, ch: char, out: &mut Vec<String>) -> Result<(), LexingError> {
        match ch {
            c if c.is_whitespace() => {
                self.finish_word(out);
                self.state = LexingState::Start;
            }
            '#' => {
                self.finish_word(out);
                self.skip_comment();
                self.state = LexingState::Start;
            }
            '\'' => {
                self.quoted = true;
                self.state = LexingState::ReadingSingleQuote;
            }
            '"' => {
                self.quoted = true;
                self.state = LexingState::ReadingDoubleQuote;
            }
            '\\' => self.read_escaped()?,
            c if is_word_char(c) => self.buffer.push(c),
            c => {
                // punctuation ends the word and stands alone
                self.finish_word(out);
                out.push(c.to_string());
                self.state = LexingState::Start;
            }
        }
        Ok(())
    }

    fn handle_single_quote(&mut self, ch: char) {
        match ch {
            '\'' => self.state = LexingState::ReadingWord,
            c => self.buffer.push(c),
        }
    }

    /// Inside double quotes a backslash only escapes `"` and `\`.
    fn handle_double_quote(&mut self, ch: char) {
        match ch {
            '"' => self.state = LexingState::ReadingWord,
            '\\' => match self.peek_char() {
                Some(next @ ('"' | '\\')) => {
                    self.read_char();
                    self.buffer.push(next);
                }
                _ => self.buffer.push('\\'),
            },
            c => self.buffer.push(c),
        }
    }

    fn read_escaped(&mut self) -> Result<(), LexingError> {
        let escaped = self.read_char().ok_or(LexingError::UnfinishedEscape)?;
        self.buffer.push(escaped);
        Ok(())
    }

    fn skip_comment(&mut self) {
        while let Some(ch) = self.read_char() {
            if ch == '\n' {
                break;
            }
        }
    }

    fn finish_word(&mut self, out: &mut Vec<String>) {
        if !self.buffer.is_empty() || self.quoted {
            out.push(std::mem::take(&mut self.buffer));
        }
        self.quoted = false;
    }
}

/// Split a command line into words.
///
/// Quoting follows POSIX shells: the quote characters themselves are removed,
/// so `deploy "a b"` yields `deploy` and `a b`.
///
/// # Returns
/// The words in order, or a [`LexingError`] if a quote or escape is left open.
pub fn split_into_words(line: &str) -> Result<Vec<String>, LexingError> {
    let mut lexer = LexingFSM::new(line);
    lexer.make_words()
}

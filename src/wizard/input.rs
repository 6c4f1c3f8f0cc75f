//! Line sources driving the configuration wizard

use std::collections::VecDeque;
use std::io::{self, BufRead};

/// Yields one line of operator input at a time; `Ok(None)` means input ended.
pub trait InputSource {
    fn next_line(&mut self) -> io::Result<Option<String>>;
}

impl<F> InputSource for F
where
    F: FnMut() -> io::Result<Option<String>>,
{
    fn next_line(&mut self) -> io::Result<Option<String>> {
        self()
    }
}

/// Reads lines from standard input
#[derive(Default)]
pub struct ConsoleInput;

impl InputSource for ConsoleInput {
    fn next_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        let n = io::stdin().lock().read_line(&mut line)?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}

/// Replays a fixed list of answers
pub struct ScriptedInput {
    lines: VecDeque<String>,
}

impl ScriptedInput {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }
}

impl InputSource for ScriptedInput {
    fn next_line(&mut self) -> io::Result<Option<String>> {
        Ok(self.lines.pop_front())
    }
}

//! Confirmation prompt.

use std::io::{BufRead, BufReader, Stderr, Stdin, Write};
use std::sync::Mutex;

use crate::error::{KpError, Result};

/// A yes/no question put to the operator.
#[cfg_attr(test, mockall::automock)]
pub trait Confirm: Send + Sync {
    /// Shows `message` and returns true if the answer is one of `accepted`.
    ///
    /// # Errors
    ///
    /// Returns an error if the answer cannot be read.
    fn confirm(&self, message: &str, accepted: &[&'static str]) -> Result<bool>;
}

/// Prompt reading one line per question.
#[derive(Debug)]
pub struct LinePrompt<R, W> {
    io: Mutex<(R, W)>,
}

impl<R: BufRead, W: Write> LinePrompt<R, W> {
    /// Creates a prompt over the given reader and writer.
    pub const fn new(reader: R, writer: W) -> Self {
        Self {
            io: Mutex::new((reader, writer)),
        }
    }
}

impl LinePrompt<BufReader<Stdin>, Stderr> {
    /// Creates a prompt reading stdin and writing to stderr.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(BufReader::new(std::io::stdin()), std::io::stderr())
    }
}

impl<R, W> Confirm for LinePrompt<R, W>
where
    R: BufRead + Send,
    W: Write + Send,
{
    fn confirm(&self, message: &str, accepted: &[&'static str]) -> Result<bool> {
        let mut io = self
            .io
            .lock()
            .map_err(|_| KpError::internal("prompt lock poisoned"))?;
        let (reader, writer) = &mut *io;

        write!(writer, "{message} ")?;
        writer.flush()?;

        let mut answer = String::new();
        reader.read_line(&mut answer)?;
        let answer = answer.trim();

        Ok(accepted.iter().any(|token| *token == answer))
    }
}

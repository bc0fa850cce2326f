//! Incremental terminal output for streamed replies.

use std::io::{self, Write};

/// Prints only the part of each accumulated text that is new.
///
/// If the accumulated text stops extending what was printed (a failed
/// session replaces it with an error message), the new text goes on a fresh
/// line.
pub(crate) struct DeltaPrinter<W: Write> {
    out: W,
    printed: String,
}

impl<W: Write> DeltaPrinter<W> {
    pub(crate) fn new(out: W) -> Self {
        Self {
            out,
            printed: String::new(),
        }
    }

    pub(crate) fn update(&mut self, accumulated: &str) -> io::Result<()> {
        match accumulated.strip_prefix(self.printed.as_str()) {
            Some(suffix) => self.out.write_all(suffix.as_bytes())?,
            None => {
                writeln!(self.out)?;
                self.out.write_all(accumulated.as_bytes())?;
            }
        }
        self.out.flush()?;

        self.printed.clear();
        self.printed.push_str(accumulated);
        Ok(())
    }

    /// Everything shown so far.
    pub(crate) fn text(&self) -> &str {
        &self.printed
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

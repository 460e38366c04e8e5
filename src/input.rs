//! Line-oriented input source for the interactive client

use tokio::io::{
    self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines, Stdin,
};

/// Reads one trimmed line at a time
pub struct LineInput<R> {
    lines: Lines<R>,
}

impl LineInput<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin> LineInput<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }

    /// Next line with surrounding whitespace removed; `None` at end of input
    ///
    /// Cancel safe, so it can sit in a `select!`.
    pub async fn read_trimmed(&mut self) -> io::Result<Option<String>> {
        Ok(self
            .lines
            .next_line()
            .await?
            .map(|line| line.trim().to_string()))
    }

    /// Write `text` (no newline) and read the answer
    pub async fn prompt<W: AsyncWrite + Unpin>(
        &mut self,
        out: &mut W,
        text: &str,
    ) -> io::Result<Option<String>> {
        out.write_all(text.as_bytes()).await?;
        out.flush().await?;
        self.read_trimmed().await
    }
}

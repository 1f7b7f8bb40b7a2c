//! Line writer shared by the command loop and in-flight invokes
//!
//! Every write is one whole line followed by a flush, so concurrent writers
//! never interleave inside a line.

use distrual_foundation::{Envelope, Result};
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

#[derive(Clone)]
pub struct LineWriter {
    inner: Arc<Mutex<BoxedWriter>>,
}

impl LineWriter {
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }

    pub async fn send(&self, envelope: &Envelope) -> Result<()> {
        self.write(&envelope.encode()?).await
    }

    /// Plain text; a missing trailing newline is added
    pub async fn line(&self, text: &str) -> Result<()> {
        let mut line = text.trim_end_matches(|c| c == '\r' || c == '\n').to_string();
        line.push('\n');
        self.write(&line).await
    }

    async fn write(&self, line: &str) -> Result<()> {
        let mut writer = self.inner.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use distrual_foundation::MessageType;
    use tokio::io::{AsyncBufReadExt, BufReader};

    #[tokio::test]
    async fn test_writes_whole_lines() {
        let (writer, reader) = tokio::io::duplex(1024);
        let out = LineWriter::new(writer);

        out.send(&Envelope::init("127.0.0.1:1234")).await.unwrap();
        out.line("Called with command hi\n").await.unwrap();
        drop(out);

        let mut lines = BufReader::new(reader).lines();
        let first = lines.next_line().await.unwrap().unwrap();
        assert_eq!(Envelope::decode(&first).unwrap().msg_type, MessageType::Init);
        assert_eq!(
            lines.next_line().await.unwrap().unwrap(),
            "Called with command hi"
        );
        assert!(lines.next_line().await.unwrap().is_none());
    }
}

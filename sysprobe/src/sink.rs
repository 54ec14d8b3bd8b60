//! Output of drained envelopes.

use sysprobe_common::{Format, MetricEnvelope, encode};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Writes envelopes to a byte stream in the configured format.
///
/// JSON envelopes are newline-delimited; CBOR items are self-delimiting and
/// written back to back.
#[derive(Debug)]
pub struct EnvelopeSink<W> {
    writer: W,
    format: Format,
    written: u64,
}

impl<W: AsyncWrite + Unpin> EnvelopeSink<W> {
    pub fn new(writer: W, format: Format) -> Self {
        Self {
            writer,
            format,
            written: 0,
        }
    }

    /// Number of envelopes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub async fn write(&mut self, envelope: &MetricEnvelope) -> sysprobe_common::Result<()> {
        let mut payload = encode(envelope, self.format)?;
        if self.format == Format::Json {
            payload.push(b'\n');
        }

        self.writer.write_all(&payload).await?;
        self.written += 1;
        Ok(())
    }

    pub async fn flush(&mut self) -> sysprobe_common::Result<()> {
        self.writer.flush().await?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

//! `Content-Length` framing for JSON-RPC over a byte stream.
//!
//! Each message is `Content-Length: N\r\n[other headers]\r\n\r\n` followed by
//! exactly `N` bytes of UTF-8 JSON.

use anyhow::{Context, Result, bail};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Frames larger than this are treated as a protocol violation.
pub const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// `Some(len)` for a `Content-Length` header line, `None` for any other header.
fn content_length(line: &str) -> Result<Option<usize>> {
    let Some((name, value)) = line.split_once(':') else {
        return Ok(None);
    };
    if !name.trim().eq_ignore_ascii_case("Content-Length") {
        return Ok(None);
    }
    let len = value
        .trim()
        .parse()
        .with_context(|| format!("invalid Content-Length `{}`", value.trim()))?;
    Ok(Some(len))
}

pub struct FrameReader<R> {
    reader: BufReader<R>,
    line: String,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            line: String::new(),
        }
    }

    /// Next message, or `Ok(None)` when the stream ends between frames.
    pub async fn read_frame(&mut self) -> Result<Option<Value>> {
        let Some(len) = self.read_headers().await? else {
            return Ok(None);
        };
        if len > MAX_FRAME_BYTES {
            bail!("frame of {len} bytes exceeds the {MAX_FRAME_BYTES} byte limit");
        }

        let mut body = vec![0u8; len];
        self.reader
            .read_exact(&mut body)
            .await
            .context("reading frame body")?;
        serde_json::from_slice(&body)
            .map(Some)
            .context("frame body is not JSON")
    }

    async fn read_headers(&mut self) -> Result<Option<usize>> {
        let mut len = None;
        let mut started = false;
        loop {
            self.line.clear();
            let read = self
                .reader
                .read_line(&mut self.line)
                .await
                .context("reading frame header")?;
            if read == 0 {
                // A partial header block is a truncated frame, not a clean close.
                if started {
                    bail!("stream ended inside frame headers");
                }
                return Ok(None);
            }
            started = true;

            let header = self.line.trim();
            if header.is_empty() {
                return len
                    .map(Some)
                    .context("frame has no Content-Length header");
            }
            if let Some(n) = content_length(header)? {
                len = Some(n);
            }
        }
    }
}

pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub async fn write_frame(&mut self, message: &Value) -> Result<()> {
        let body = serde_json::to_vec(message).context("serializing frame")?;
        let header = format!("Content-Length: {}\r\n\r\n", body.len());
        self.writer
            .write_all(header.as_bytes())
            .await
            .context("writing frame header")?;
        self.writer
            .write_all(&body)
            .await
            .context("writing frame body")?;
        self.writer.flush().await.context("flushing frame")
    }
}

use std::borrow::Cow;
use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::http::response::Response;

const HTTP_VERSION: &str = "HTTP/1.1";

/// Renders `resp` into wire bytes.
///
/// When the response carries a coding and a framed body, the body is
/// compressed first and `Content-length` counts the compressed bytes.
/// Fails only if compression fails.
pub fn serialize_response(resp: &Response) -> io::Result<Vec<u8>> {
    let body = encoded_body(resp)?;
    Ok(render(resp, &body))
}

fn encoded_body(resp: &Response) -> io::Result<Cow<'_, [u8]>> {
    if !resp.has_framed_body() {
        return Ok(Cow::Borrowed(&[]));
    }

    match resp.content_encoding {
        Some(encoding) => encoding.encode(&resp.body).map(Cow::Owned),
        None => Ok(Cow::Borrowed(&resp.body)),
    }
}

fn render(resp: &Response, body: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(128 + body.len());

    // Status line
    let status_line = format!(
        "{} {} {}\r\n",
        HTTP_VERSION,
        resp.status.as_u16(),
        resp.status.reason_phrase()
    );
    buf.extend_from_slice(status_line.as_bytes());

    if let Some(encoding) = resp.content_encoding {
        buf.extend_from_slice(b"Content-Encoding: ");
        buf.extend_from_slice(encoding.as_str().as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    if let (Some(content_type), true) = (&resp.content_type, resp.has_framed_body()) {
        buf.extend_from_slice(format!("Content-type: {}\r\n", content_type).as_bytes());
        buf.extend_from_slice(format!("Content-length: {}\r\n", body.len()).as_bytes());
    }

    // Header/body separator
    buf.extend_from_slice(b"\r\n");

    buf.extend_from_slice(body);

    buf
}

pub struct ResponseWriter {
    buffer: Vec<u8>,
    written: usize,
}

impl ResponseWriter {
    /// Serializes `response`, falling back to a plain 500 if the body
    /// cannot be encoded.
    pub fn new(response: &Response) -> Self {
        let buffer = serialize_response(response).unwrap_or_else(|e| {
            tracing::error!(
                status = response.status.as_u16(),
                encoding = ?response.content_encoding,
                error = %e,
                "Failed to encode response body"
            );
            render(&Response::internal_error(), &[])
        });

        Self { buffer, written: 0 }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    pub async fn write_to_stream<S>(&mut self, stream: &mut S) -> anyhow::Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        while self.written < self.buffer.len() {
            let n = stream.write(&self.buffer[self.written..]).await?;

            if n == 0 {
                return Err(anyhow::anyhow!("connection closed while writing"));
            }

            self.written += n;
        }

        stream.flush().await?;
        Ok(())
    }
}

use std::sync::Arc;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

use crate::http::parser::{ParseError, parse_http_request};
use crate::http::request::Request;
use crate::http::writer::ResponseWriter;
use crate::router::{Router, rejection};

/// Default cap on bytes buffered for a single request.
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 1024 * 1024;

const READ_CHUNK: usize = 4096;

pub struct Connection<S> {
    stream: S,
    buffer: BytesMut,
    router: Arc<Router>,
    max_request_bytes: usize,
    state: ConnectionState,
}

pub enum ConnectionState {
    Reading,
    Processing(Request),
    Rejecting(ParseError),
    Writing(ResponseWriter, bool), // bool = keep_alive?
    Closed,
}

enum ReadOutcome {
    Request(Request),
    Malformed(ParseError),
    Eof,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, router: Arc<Router>) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(READ_CHUNK),
            router,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            state: ConnectionState::Reading,
        }
    }

    pub fn with_max_request_bytes(mut self, limit: usize) -> Self {
        self.max_request_bytes = limit;
        self
    }

    /// Serves requests until the peer closes, asks to close, or an I/O error occurs.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        loop {
            match &mut self.state {
                ConnectionState::Reading => {
                    self.state = match self.read_request().await? {
                        ReadOutcome::Request(req) => ConnectionState::Processing(req),
                        ReadOutcome::Malformed(e) => ConnectionState::Rejecting(e),
                        ReadOutcome::Eof => ConnectionState::Closed,
                    };
                }

                ConnectionState::Processing(req) => {
                    let response = self.router.route(req).await;
                    let keep_alive = req.keep_alive();

                    let writer = ResponseWriter::new(&response);
                    self.state = ConnectionState::Writing(writer, keep_alive);
                }

                ConnectionState::Rejecting(e) => {
                    // Truncated or oversized input leaves nothing to resync on.
                    let keep_alive = !matches!(e, ParseError::Incomplete | ParseError::TooLarge);

                    let writer = ResponseWriter::new(&rejection(e));
                    self.state = ConnectionState::Writing(writer, keep_alive);
                }

                ConnectionState::Writing(writer, keep_alive) => {
                    writer.write_to_stream(&mut self.stream).await?;

                    if *keep_alive {
                        self.state = ConnectionState::Reading;
                    } else {
                        self.state = ConnectionState::Closed;
                    }
                }

                ConnectionState::Closed => {
                    break;
                }
            }
        }

        Ok(())
    }

    async fn read_request(&mut self) -> anyhow::Result<ReadOutcome> {
        loop {
            if !self.buffer.is_empty() {
                match parse_http_request(&self.buffer) {
                    Ok((request, consumed)) => {
                        self.buffer.advance(consumed);
                        return Ok(ReadOutcome::Request(request));
                    }

                    Err(ParseError::Incomplete) => {
                        if self.buffer.len() >= self.max_request_bytes {
                            self.buffer.clear();
                            return Ok(ReadOutcome::Malformed(ParseError::TooLarge));
                        }
                    }

                    Err(e) => {
                        self.buffer.clear();
                        return Ok(ReadOutcome::Malformed(e));
                    }
                }
            }

            let n = self.stream.read_buf(&mut self.buffer).await?;

            if n == 0 {
                if self.buffer.is_empty() {
                    return Ok(ReadOutcome::Eof);
                }

                // Peer closed mid-request.
                self.buffer.clear();
                return Ok(ReadOutcome::Malformed(ParseError::Incomplete));
            }
        }
    }
}

use std::fmt;

use crate::http::request::{Header, Method, Request};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Request line is not `METHOD SP TARGET SP VERSION`.
    InvalidRequest,
    InvalidHeader,
    InvalidContentLength,
    /// More bytes are needed before the request is complete.
    Incomplete,
    /// The connection buffered more than its limit without a complete request.
    TooLarge,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::InvalidRequest => write!(f, "malformed request line"),
            ParseError::InvalidHeader => write!(f, "malformed header line"),
            ParseError::InvalidContentLength => write!(f, "invalid Content-Length"),
            ParseError::Incomplete => write!(f, "incomplete request"),
            ParseError::TooLarge => write!(f, "request exceeds buffer limit"),
        }
    }
}

impl std::error::Error for ParseError {}

enum State {
    RequestLine,
    Headers,
    Body,
}

/// Parses one request from the front of `buf`.
///
/// Returns the request and the number of bytes it occupied. When the request
/// declares a Content-Length the body is exactly that long; otherwise the
/// body is the rest of the buffer.
pub fn parse_http_request(buf: &[u8]) -> Result<(Request, usize), ParseError> {
    let mut state = State::RequestLine;
    let mut pos = 0;

    let mut method = None;
    let mut path = String::new();
    let mut version = String::new();
    let mut headers = Vec::new();

    loop {
        match state {
            State::RequestLine => {
                let end = find_crlf(buf, pos).ok_or(ParseError::Incomplete)?;
                let line = std::str::from_utf8(&buf[pos..end])
                    .map_err(|_| ParseError::InvalidRequest)?;

                let (m, p, v) = parse_request_line(line)?;
                method = Some(m);
                path = p.to_string();
                version = v.to_string();

                pos = end + 2;
                state = State::Headers;
            }

            State::Headers => {
                let end = find_crlf(buf, pos).ok_or(ParseError::Incomplete)?;

                if end == pos {
                    pos += 2;
                    state = State::Body;
                    continue;
                }

                let line = std::str::from_utf8(&buf[pos..end])
                    .map_err(|_| ParseError::InvalidHeader)?;
                headers.push(parse_header_line(line)?);

                pos = end + 2;
            }

            State::Body => {
                let remaining = &buf[pos..];
                let (body, consumed) = match declared_length(&headers)? {
                    Some(len) if remaining.len() < len => return Err(ParseError::Incomplete),
                    Some(len) => (remaining[..len].to_vec(), pos + len),
                    None => (remaining.to_vec(), buf.len()),
                };

                let request = Request {
                    method: method.ok_or(ParseError::InvalidRequest)?,
                    path,
                    version,
                    headers,
                    body,
                };

                return Ok((request, consumed));
            }
        }
    }
}

fn parse_request_line(line: &str) -> Result<(Method, &str, &str), ParseError> {
    let mut parts = line.split(' ');

    let method_str = parts.next().filter(|s| !s.is_empty()).ok_or(ParseError::InvalidRequest)?;
    let target = parts.next().ok_or(ParseError::InvalidRequest)?;
    let version = parts.next().filter(|s| !s.is_empty()).ok_or(ParseError::InvalidRequest)?;

    if !target.starts_with('/') || parts.next().is_some() {
        return Err(ParseError::InvalidRequest);
    }

    Ok((Method::from_token(method_str), target, version))
}

// Name is everything before the first space, minus trailing colons.
fn parse_header_line(line: &str) -> Result<Header, ParseError> {
    let (name, value) = line.split_once(' ').unwrap_or((line, ""));
    let name = name.trim_end_matches(':');

    if name.is_empty() {
        return Err(ParseError::InvalidHeader);
    }

    Ok(Header::new(name, value))
}

fn declared_length(headers: &[Header]) -> Result<Option<usize>, ParseError> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case("Content-Length"))
        .map(|h| {
            h.value
                .trim()
                .parse::<usize>()
                .map_err(|_| ParseError::InvalidContentLength)
        })
        .transpose()
}

fn find_crlf(buf: &[u8], from: usize) -> Option<usize> {
    buf.get(from..)?
        .windows(2)
        .position(|w| w == b"\r\n")
        .map(|i| from + i)
}

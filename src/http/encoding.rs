//! Content-encoding negotiation.
//!
//! The server supports a single coding, gzip. Negotiation reads the client's
//! `Accept-Encoding` list and picks the last supported entry.

use std::io::{self, Write};

use flate2::Compression;
use flate2::write::GzEncoder;

/// A content coding the server can apply to response bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Gzip,
}

/// Codings the server can produce.
pub const SUPPORTED: [ContentEncoding; 1] = [ContentEncoding::Gzip];

impl ContentEncoding {
    /// Token used in `Accept-Encoding` and `Content-Encoding`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentEncoding::Gzip => "gzip",
        }
    }

    /// Looks up a supported coding by token, ignoring ASCII case.
    pub fn from_token(token: &str) -> Option<Self> {
        SUPPORTED
            .iter()
            .copied()
            .find(|enc| enc.as_str().eq_ignore_ascii_case(token))
    }

    /// Compresses `body` with this coding.
    pub fn encode(&self, body: &[u8]) -> io::Result<Vec<u8>> {
        match self {
            ContentEncoding::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(body)?;
                encoder.finish()
            }
        }
    }
}

/// Picks the coding to use for a response.
///
/// `accept` is the raw `Accept-Encoding` value. Entries are comma separated
/// and trimmed; the last one naming a supported coding wins. Parameters after
/// `;` are ignored except `q=0`, which rules the entry out.
///
/// ```
/// # use courier::http::encoding::{negotiate, ContentEncoding};
/// assert_eq!(negotiate(Some("identity, gzip")), Some(ContentEncoding::Gzip));
/// assert_eq!(negotiate(Some("br")), None);
/// assert_eq!(negotiate(None), None);
/// ```
pub fn negotiate(accept: Option<&str>) -> Option<ContentEncoding> {
    let mut selected = None;

    for entry in accept?.split(',') {
        let mut params = entry.trim().split(';');
        let token = params.next().unwrap_or("").trim();

        let Some(encoding) = ContentEncoding::from_token(token) else {
            continue;
        };

        if params.any(is_zero_quality) {
            continue;
        }

        selected = Some(encoding);
    }

    selected
}

fn is_zero_quality(param: &str) -> bool {
    let Some((key, value)) = param.split_once('=') else {
        return false;
    };

    key.trim().eq_ignore_ascii_case("q")
        && value.trim().parse::<f32>().map(|q| q == 0.0).unwrap_or(false)
}

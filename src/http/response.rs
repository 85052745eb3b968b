use crate::http::encoding::ContentEncoding;

pub const TEXT_PLAIN: &str = "text/plain";
pub const OCTET_STREAM: &str = "application/octet-stream";

/// HTTP status codes produced by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200 OK
    Ok,
    /// 201 Created
    Created,
    /// 404 Not Found
    NotFound,
    /// 500 Internal Server Error
    InternalServerError,
}

impl StatusCode {
    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use courier::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.as_u16(), 200);
    /// assert_eq!(StatusCode::NotFound.as_u16(), 404);
    /// ```
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::Created => 201,
            StatusCode::NotFound => 404,
            StatusCode::InternalServerError => 500,
        }
    }

    /// Returns the reason phrase written on the status line.
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::Created => "Created",
            StatusCode::NotFound => "Not Found",
            StatusCode::InternalServerError => "Internal Server Error",
        }
    }
}

/// A response produced by the router, before serialization.
///
/// An empty `body` means "no body". The body is only framed on the wire
/// when `content_type` is also set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: StatusCode,
    pub content_type: Option<String>,
    /// Coding to apply to the body, also announced in `Content-Encoding`.
    pub content_encoding: Option<ContentEncoding>,
    pub body: Vec<u8>,
}

/// Builder for constructing HTTP responses in a fluent style.
///
/// # Example
///
/// ```
/// # use courier::http::response::{ResponseBuilder, StatusCode};
/// let response = ResponseBuilder::new(StatusCode::Ok)
///     .content_type("text/plain")
///     .body(b"hi".to_vec())
///     .build();
/// assert!(response.has_framed_body());
/// ```
pub struct ResponseBuilder {
    status: StatusCode,
    content_type: Option<String>,
    content_encoding: Option<ContentEncoding>,
    body: Vec<u8>,
}

impl ResponseBuilder {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            content_type: None,
            content_encoding: None,
            body: Vec::new(),
        }
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn encoding(mut self, encoding: Option<ContentEncoding>) -> Self {
        self.content_encoding = encoding;
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn build(self) -> Response {
        Response {
            status: self.status,
            content_type: self.content_type,
            content_encoding: self.content_encoding,
            body: self.body,
        }
    }
}

impl Response {
    /// Bare `200 OK` with no headers and no body.
    pub fn empty_ok() -> Self {
        ResponseBuilder::new(StatusCode::Ok).build()
    }

    /// `200 OK` carrying a `text/plain` body.
    pub fn text(body: impl Into<Vec<u8>>) -> Self {
        ResponseBuilder::new(StatusCode::Ok)
            .content_type(TEXT_PLAIN)
            .body(body)
            .build()
    }

    /// `200 OK` carrying raw file contents.
    pub fn octet_stream(body: impl Into<Vec<u8>>) -> Self {
        ResponseBuilder::new(StatusCode::Ok)
            .content_type(OCTET_STREAM)
            .body(body)
            .build()
    }

    pub fn created() -> Self {
        ResponseBuilder::new(StatusCode::Created).build()
    }

    pub fn not_found() -> Self {
        ResponseBuilder::new(StatusCode::NotFound)
            .content_type(TEXT_PLAIN)
            .build()
    }

    pub fn internal_error() -> Self {
        ResponseBuilder::new(StatusCode::InternalServerError)
            .content_type(TEXT_PLAIN)
            .build()
    }

    /// Sets the negotiated coding.
    pub fn with_encoding(mut self, encoding: Option<ContentEncoding>) -> Self {
        self.content_encoding = encoding;
        self
    }

    /// True when the serializer will emit `Content-type`, `Content-length`
    /// and the body.
    pub fn has_framed_body(&self) -> bool {
        self.content_type.is_some() && !self.body.is_empty()
    }
}

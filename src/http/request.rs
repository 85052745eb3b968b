/// Prefix of the echo route. Everything after it is echoed back.
pub const ECHO_PREFIX: &str = "/echo/";

/// HTTP request methods.
///
/// Any token is accepted. Only POST changes routing (it selects the file
/// write path); every other method is treated as a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// POST - Create or submit data
    POST,
    /// PUT - Replace a resource
    PUT,
    /// DELETE - Delete a resource
    DELETE,
    /// HEAD - Like GET but without the response body
    HEAD,
    /// OPTIONS - Describe communication options
    OPTIONS,
    /// PATCH - Partial modification of a resource
    PATCH,
    /// Any other method token, kept as sent
    Other(String),
}

impl Method {
    /// Parses an HTTP method token.
    ///
    /// Matching is case-sensitive, as method tokens are on the wire.
    ///
    /// # Example
    ///
    /// ```
    /// # use courier::http::request::Method;
    /// assert_eq!(Method::from_token("POST"), Method::POST);
    /// assert_eq!(Method::from_token("post"), Method::Other("post".to_string()));
    /// ```
    pub fn from_token(s: &str) -> Self {
        match s {
            "GET" => Method::GET,
            "POST" => Method::POST,
            "PUT" => Method::PUT,
            "DELETE" => Method::DELETE,
            "HEAD" => Method::HEAD,
            "OPTIONS" => Method::OPTIONS,
            "PATCH" => Method::PATCH,
            other => Method::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
            Method::PATCH => "PATCH",
            Method::Other(token) => token,
        }
    }
}

/// A single header line as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    /// Raw remainder of the line after the separator space.
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Represents a parsed HTTP request from a client.
///
/// Headers keep their wire order. Lookups are case-insensitive and the first
/// matching header wins.
#[derive(Debug, Clone)]
pub struct Request {
    /// The HTTP method (GET, POST, etc.)
    pub method: Method,
    /// The request target, always starting with `/`
    pub path: String,
    /// HTTP version as sent by the client (not validated)
    pub version: String,
    /// Request headers in the order they were received
    pub headers: Vec<Header>,
    /// Request body, possibly empty
    pub body: Vec<u8>,
}

/// Builder for constructing Request objects.
pub struct RequestBuilder {
    method: Option<Method>,
    path: Option<String>,
    version: Option<String>,
    headers: Vec<Header>,
    body: Vec<u8>,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self {
            method: None,
            path: None,
            version: None,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Appends a header. Repeated names are kept in order.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(Header::new(name, value));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn build(self) -> Result<Request, &'static str> {
        let path = self.path.ok_or("path missing")?;
        if !path.starts_with('/') {
            return Err("path must start with '/'");
        }

        Ok(Request {
            method: self.method.ok_or("method missing")?,
            path,
            version: self.version.unwrap_or_else(|| "HTTP/1.1".to_string()),
            headers: self.headers,
            body: self.body,
        })
    }
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Request {
    /// Retrieves the first header whose name matches `name`, ignoring ASCII case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Whether the connection should stay open after the response.
    ///
    /// HTTP/1.1 defaults to keep-alive; only `Connection: close` ends it.
    pub fn keep_alive(&self) -> bool {
        self.header("Connection")
            .map(|v| !v.trim().eq_ignore_ascii_case("close"))
            .unwrap_or(true)
    }

    /// Content used by the echo and header-reflect routes.
    ///
    /// The suffix after `/echo/` for echo paths, the full path otherwise.
    ///
    /// ```
    /// # use courier::http::request::{Method, RequestBuilder};
    /// let req = RequestBuilder::new().method(Method::GET).path("/echo/abc").build().unwrap();
    /// assert_eq!(req.echo_content(), "abc");
    /// ```
    pub fn echo_content(&self) -> &str {
        self.path.strip_prefix(ECHO_PREFIX).unwrap_or(&self.path)
    }

    /// Header name a path refers to: the echo content, slashes removed, lower-cased.
    pub fn reflect_key(&self) -> String {
        self.echo_content().replace('/', "").to_ascii_lowercase()
    }
}

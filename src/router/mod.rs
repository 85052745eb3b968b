//! Request routing
//!
//! Maps a parsed request to one of the server's fixed behaviors. Rules are
//! checked in order and the first match wins:
//!
//! 1. `/` answers a bare `200 OK`.
//! 2. `/echo/<text>` returns `<text>` as `text/plain`.
//! 3. A path naming one of the request's headers returns that header's value.
//! 4. `/files/<name>` reads (any method) or writes (POST) a stored file.
//! 5. Anything else is `404 Not Found`.

use crate::http::encoding::negotiate;
use crate::http::parser::{ParseError, parse_http_request};
use crate::http::request::{ECHO_PREFIX, Method, Request};
use crate::http::response::Response;
use crate::http::writer::ResponseWriter;
use crate::storage::{FileStore, StoreError};

/// Prefix of the file routes.
pub const FILES_PREFIX: &str = "/files/";

/// The behavior selected for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route<'a> {
    Root,
    Echo(&'a str),
    /// Value of the header the path names.
    ReflectHeader(&'a str),
    ReadFile(&'a str),
    WriteFile(&'a str),
    NotFound,
}

impl<'a> Route<'a> {
    /// Classifies `req` without performing any I/O.
    pub fn resolve(req: &'a Request) -> Self {
        if req.path == "/" {
            return Route::Root;
        }

        if req.path.starts_with(ECHO_PREFIX) {
            return Route::Echo(req.echo_content());
        }

        let key = req.reflect_key();
        if !key.is_empty() {
            if let Some(value) = req.header(&key) {
                return Route::ReflectHeader(value);
            }
        }

        if let Some(name) = req.path.strip_prefix(FILES_PREFIX) {
            return match req.method {
                Method::POST => Route::WriteFile(name),
                _ => Route::ReadFile(name),
            };
        }

        Route::NotFound
    }
}

/// Produces responses for requests, using a [`FileStore`] for file routes.
#[derive(Debug, Clone)]
pub struct Router {
    store: FileStore,
}

impl Router {
    pub fn new(store: FileStore) -> Self {
        Self { store }
    }

    /// Routes one request to exactly one response.
    ///
    /// Failures inside a route become error responses; nothing is propagated.
    pub async fn route(&self, req: &Request) -> Response {
        let route = Route::resolve(req);

        // The root probe never carries a coding.
        if route == Route::Root {
            return Response::empty_ok();
        }

        let encoding = negotiate(req.header("Accept-Encoding"));

        let response = match route {
            Route::Root => Response::empty_ok(),
            Route::Echo(text) => Response::text(text),
            Route::ReflectHeader(value) => Response::text(value),
            Route::ReadFile(name) => self.read_file(name).await,
            Route::WriteFile(name) => self.write_file(name, &req.body).await,
            Route::NotFound => Response::not_found(),
        };

        tracing::debug!(
            method = req.method.as_str(),
            path = %req.path,
            status = response.status.as_u16(),
            encoding = ?encoding,
            "Request routed"
        );

        response.with_encoding(encoding)
    }

    /// Full pipeline for one complete buffer: parse, route, serialize.
    ///
    /// Malformed or truncated input yields a 500 response.
    pub async fn handle_bytes(&self, buf: &[u8]) -> Vec<u8> {
        let response = match parse_http_request(buf) {
            Ok((request, _)) => self.route(&request).await,
            Err(e) => rejection(&e),
        };

        ResponseWriter::new(&response).into_bytes()
    }

    async fn read_file(&self, name: &str) -> Response {
        match self.store.read(name).await {
            Ok(contents) => Response::octet_stream(contents),
            Err(StoreError::NotFound) => Response::not_found(),
            Err(e) => {
                tracing::warn!(file = name, error = %e, "File read failed");
                Response::not_found()
            }
        }
    }

    async fn write_file(&self, name: &str, body: &[u8]) -> Response {
        match self.store.write(name, body).await {
            Ok(()) => Response::created(),
            Err(e) => {
                tracing::warn!(file = name, error = %e, "File write failed");
                Response::internal_error()
            }
        }
    }
}

/// Response sent for a request that could not be parsed.
pub fn rejection(error: &ParseError) -> Response {
    tracing::warn!(error = %error, "Rejecting malformed request");
    Response::internal_error()
}

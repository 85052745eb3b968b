//! HTTP protocol implementation.
//!
//! This module implements the HTTP/1.1 subset the server speaks: a request
//! parser, content-encoding negotiation, response serialization and the
//! per-connection loop.
//!
//! # Architecture
//!
//! - **`connection`**: The connection handler implementing the request-response state machine
//! - **`parser`**: Parses incoming HTTP requests from byte buffers
//! - **`request`**: HTTP request representation and header lookup
//! - **`encoding`**: `Accept-Encoding` negotiation and gzip compression
//! - **`response`**: HTTP response representation with builder pattern
//! - **`writer`**: Serializes and writes HTTP responses to the client
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← Wait for incoming request data
//!        └──────┬──────┘
//!               │ Request received (or malformed → Rejecting)
//!               ▼
//!        ┌──────────────────┐
//!        │   Processing     │ ← Route and build the response
//!        └──────┬───────────┘
//!               │ Response ready
//!               ▼
//!        ┌──────────────────┐
//!        │    Writing       │ ← Send response to client
//!        └──────┬───────────┘
//!               │ Response sent
//!               ├─ Keep-Alive → Reading (same connection)
//!               └─ Close → Closed
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use courier::http::connection::Connection;
//! use courier::router::Router;
//! use courier::storage::FileStore;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let listener = TcpListener::bind("127.0.0.1:4221").await?;
//!     let router = Arc::new(Router::new(FileStore::new("/tmp/")));
//!
//!     loop {
//!         let (socket, _addr) = listener.accept().await?;
//!         let router = router.clone();
//!         tokio::spawn(async move {
//!             let mut conn = Connection::new(socket, router);
//!             if let Err(e) = conn.run().await {
//!                 eprintln!("Connection error: {}", e);
//!             }
//!         });
//!     }
//! }
//! ```

pub mod connection;
pub mod encoding;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;

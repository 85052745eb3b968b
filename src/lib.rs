//! Courier - minimal HTTP/1.1 server
//!
//! Core library: request parsing, routing, file storage and response
//! serialization, plus the listener that ties them to TCP.

pub mod config;
pub mod http;
pub mod router;
pub mod server;
pub mod storage;

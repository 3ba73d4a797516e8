//! Negotiated HTTP response compression middleware for Tower.
//!
//! This crate provides a Tower layer that negotiates a content encoding with
//! the client via the `Accept-Encoding` header and transparently compresses
//! the response body with Gzip or Deflate. The inner service is unaware it is
//! being compressed.
//!
//! # Example
//!
//! ```ignore
//! use http_negotiated_compression::CompressionLayer;
//! use tower::ServiceBuilder;
//!
//! let service = ServiceBuilder::new()
//!     .layer(CompressionLayer::new())
//!     .service(my_service);
//! ```
//!
//! # Compression Rules
//!
//! The middleware serves the response untouched when:
//! - The request method is `HEAD` (a HEAD response carries no body)
//! - `Content-Encoding` is already set (never double-encode)
//! - `Content-Range` is present (range responses)
//! - `Content-Type` does not classify as compressible (or is unset)
//!
//! When the response is eligible but the request's `Accept-Encoding` matches
//! neither `gzip` nor `deflate` — including when the header is absent — the
//! middleware answers `406 Not Acceptable` with the plaintext body
//! `supported encodings: gzip, deflate`, and the inner response is discarded.
//!
//! # Response Modifications
//!
//! When compression is applied:
//! - `Content-Encoding` header is set to the negotiated codec
//! - `Content-Length` header is removed (compressed size is unknown)
//! - `Accept-Ranges` header is removed
//! - `Vary` header includes `Accept-Encoding`

#![deny(missing_docs)]

mod body;
mod classify;
mod codec;
mod future;
mod layer;
mod service;

pub use body::CompressionBody;
pub use future::ResponseFuture;
pub use layer::CompressionLayer;
pub use service::CompressionService;

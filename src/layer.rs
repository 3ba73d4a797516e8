use crate::service::CompressionService;
use tower::Layer;

/// A Tower layer that negotiates and compresses HTTP response bodies.
///
/// The layer carries no configuration: the supported encodings (gzip,
/// deflate) and the compressibility policy are fixed.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompressionLayer;

impl CompressionLayer {
    /// Creates a new compression layer.
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for CompressionLayer {
    type Service = CompressionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CompressionService::new(inner)
    }
}

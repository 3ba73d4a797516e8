use compression_codecs::{EncodeV2, deflate::DeflateEncoder, gzip::GzipEncoder};
use compression_core::Level;

/// Supported compression codecs, in server preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// Gzip compression.
    Gzip,
    /// Deflate compression.
    Deflate,
}

impl Codec {
    /// Returns the Content-Encoding header value for this codec.
    pub fn content_encoding(&self) -> &'static str {
        match self {
            Codec::Gzip => "gzip",
            Codec::Deflate => "deflate",
        }
    }

    /// Creates a new encoder for this codec at its default level.
    pub fn encoder(&self) -> Box<dyn EncodeV2 + Send> {
        match self {
            Codec::Gzip => Box::new(GzipEncoder::new(Level::Default.into())),
            Codec::Deflate => Box::new(DeflateEncoder::new(Level::Default.into())),
        }
    }

    /// Negotiates a codec from a raw `Accept-Encoding` header value.
    ///
    /// The header value is expected to be comma-separated encodings with
    /// optional quality values (e.g., "gzip, deflate;q=0.5"). A `*` entry
    /// stands for any encoding not named explicitly. Returns `None` when
    /// nothing the client accepts is supported, which includes an explicit
    /// `q=0` on everything we could offer.
    ///
    /// Gzip wins when qualities tie.
    pub fn from_accept_encoding(header: &str) -> Option<Codec> {
        let mut gzip: Option<f32> = None;
        let mut deflate: Option<f32> = None;
        let mut wildcard: Option<f32> = None;

        for part in header.split(',') {
            let (encoding, quality) = parse_encoding_with_quality(part.trim());

            if encoding.eq_ignore_ascii_case("gzip") || encoding.eq_ignore_ascii_case("x-gzip") {
                gzip = Some(quality);
            } else if encoding.eq_ignore_ascii_case("deflate") {
                deflate = Some(quality);
            } else if encoding == "*" {
                wildcard = Some(quality);
            }
        }

        // An explicit entry for a token overrides the wildcard.
        let gzip = gzip.or(wildcard).unwrap_or(0.0);
        let deflate = deflate.or(wildcard).unwrap_or(0.0);

        if gzip > 0.0 && gzip >= deflate {
            Some(Codec::Gzip)
        } else if deflate > 0.0 {
            Some(Codec::Deflate)
        } else {
            None
        }
    }
}

/// Parses an encoding entry like "gzip" or "deflate;q=0.8" into (encoding, quality).
fn parse_encoding_with_quality(s: &str) -> (&str, f32) {
    let mut parts = s.splitn(2, ';');
    let encoding = parts.next().unwrap_or("").trim();

    let quality = parts
        .next()
        .and_then(|q| {
            let q = q.trim();
            if q.starts_with("q=") || q.starts_with("Q=") {
                q[2..].parse::<f32>().ok()
            } else {
                None
            }
        })
        .unwrap_or(1.0);

    (encoding, quality)
}

//! Media-type compressibility classification.

/// Returns whether content of the given media type is worth compressing.
///
/// Media-type parameters (`; charset=utf-8`) are ignored and matching is
/// case-insensitive. An empty or absent media type is not compressible:
/// without a declared type there is no basis for assuming text-like content.
pub(crate) fn is_compressible(content_type: &str) -> bool {
    let mime = content_type.split(';').next().unwrap_or("");
    let mime = mime.trim().to_ascii_lowercase();

    if mime.is_empty() {
        return false;
    }

    // All text types compress well, including text/event-stream and text/csv.
    if mime.starts_with("text/") {
        return true;
    }

    // Structured-syntax suffixes (image/svg+xml, application/hal+json, ...).
    if mime.ends_with("+json") || mime.ends_with("+xml") || mime.ends_with("+text") {
        return true;
    }

    matches!(
        mime.as_str(),
        "application/json"
            | "application/javascript"
            | "application/ecmascript"
            | "application/xml"
            | "application/wasm"
            | "application/x-www-form-urlencoded"
    )
}

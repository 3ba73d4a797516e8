use crate::body::CompressionBody;
use crate::classify;
use crate::codec::Codec;
use http::{Response, StatusCode, header};
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

pin_project! {
    /// Future for compression service responses.
    pub struct ResponseFuture<F> {
        #[pin]
        inner: F,
        negotiated: Option<Codec>,
        head: bool,
    }
}

impl<F> ResponseFuture<F> {
    pub(crate) fn new(inner: F, negotiated: Option<Codec>, head: bool) -> Self {
        Self {
            inner,
            negotiated,
            head,
        }
    }
}

impl<F, B, E> Future for ResponseFuture<F>
where
    F: Future<Output = Result<Response<B>, E>>,
{
    type Output = Result<Response<CompressionBody<B>>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        match this.inner.poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Ready(Ok(response)) => {
                let response = wrap_response(response, *this.negotiated, *this.head);
                Poll::Ready(Ok(response))
            }
        }
    }
}

/// Applies the compression policy to a completed response head.
///
/// Runs once the inner service has produced its response, so the headers the
/// eligibility checks need are set, and before any body frame moves. Headers
/// are final by the time the first body byte exists.
fn wrap_response<B>(
    response: Response<B>,
    negotiated: Option<Codec>,
    head: bool,
) -> Response<CompressionBody<B>> {
    let (mut parts, body) = response.into_parts();

    // A HEAD response carries no body, an already-encoded response must not
    // be encoded twice, a range response would lose its byte offsets, and a
    // non-compressible type is not worth the cycles. All of these serve the
    // inner response untouched, without consulting negotiation.
    let eligible = !head
        && !parts.headers.contains_key(header::CONTENT_ENCODING)
        && !parts.headers.contains_key(header::CONTENT_RANGE)
        && is_compressible_response(&parts.headers);

    if !eligible {
        return Response::from_parts(parts, CompressionBody::passthrough(body));
    }

    let Some(codec) = negotiated else {
        // Negotiation failed on an otherwise compressible response: reject
        // with 406 and the fixed plaintext body. The inner response is
        // discarded, its body never polled.
        let mut rejection = Response::new(CompressionBody::not_acceptable());
        *rejection.status_mut() = StatusCode::NOT_ACCEPTABLE;
        return rejection;
    };

    parts.headers.insert(
        header::CONTENT_ENCODING,
        header::HeaderValue::from_static(codec.content_encoding()),
    );

    // Remove Content-Length since compressed size is unknown
    parts.headers.remove(header::CONTENT_LENGTH);

    // Remove Accept-Ranges since we can't support ranges on compressed content
    parts.headers.remove(header::ACCEPT_RANGES);

    add_vary_accept_encoding(&mut parts.headers);

    Response::from_parts(parts, CompressionBody::compressed(body, codec))
}

/// Classifies the response's declared Content-Type. An unset Content-Type
/// classifies as not compressible.
fn is_compressible_response(headers: &header::HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(classify::is_compressible)
}

/// Adds Accept-Encoding to the Vary header if not already covered.
fn add_vary_accept_encoding(headers: &mut header::HeaderMap) {
    for vary in headers.get_all(header::VARY) {
        if let Ok(vary_str) = vary.to_str() {
            let covered = vary_str.split(',').any(|v| {
                let v = v.trim();
                v.eq_ignore_ascii_case("*") || v.eq_ignore_ascii_case("accept-encoding")
            });
            if covered {
                return;
            }
        }
    }

    headers.append(
        header::VARY,
        header::HeaderValue::from_static("accept-encoding"),
    );
}

use crate::codec::Codec;
use crate::future::ResponseFuture;
use http::{Method, Request};
use std::task::{Context, Poll};
use tower::Service;

/// A Tower service that negotiates and compresses HTTP response bodies.
#[derive(Debug, Clone)]
pub struct CompressionService<S> {
    inner: S,
}

impl<S> CompressionService<S> {
    /// Creates a new compression service wrapping the given inner service.
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    /// Returns a reference to the inner service.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Returns a mutable reference to the inner service.
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Consumes this service, returning the inner service.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for CompressionService<S>
where
    S: Service<Request<ReqBody>, Response = http::Response<ResBody>>,
{
    type Response = http::Response<crate::body::CompressionBody<ResBody>>;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        // The two request-side facts the response policy needs: a HEAD
        // response must never be compressed, and an absent Accept-Encoding
        // means the client accepts no encoding at all.
        let head = req.method() == Method::HEAD;
        let negotiated = req
            .headers()
            .get(http::header::ACCEPT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .and_then(Codec::from_accept_encoding);

        let inner = self.inner.call(req);

        ResponseFuture::new(inner, negotiated, head)
    }
}

#[cfg(test)]
mod tests {
    use crate::CompressionLayer;
    use crate::body::{CompressionBody, NOT_ACCEPTABLE_BODY};
    use crate::codec::Codec;
    use bytes::Bytes;
    use compression_core::util::{PartialBuffer, WriteBuffer};
    use http::{HeaderMap, Method, Request, Response, StatusCode, header};
    use http_body::Body;
    use http_body_util::Full;
    use std::convert::Infallible;
    use std::future::Future;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tower::{Layer, Service, service_fn};

    const HELLO: &str = "Hello，世界";

    /// Runs a request through the full layer over an inner service that
    /// serves `HELLO` with the given content type, returning status, headers
    /// and collected body bytes.
    fn serve_hello(request: Request<()>, content_type: &'static str) -> TestResponse {
        let mut service = CompressionLayer::new().layer(service_fn(move |_req: Request<()>| {
            let mut response = Response::new(Full::new(Bytes::from_static(HELLO.as_bytes())));
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                header::HeaderValue::from_static(content_type),
            );
            std::future::ready(Ok::<_, Infallible>(response))
        }));

        let future = service.call(request);
        let response = poll_now(future).expect("service future not ready").unwrap();
        collect(response)
    }

    struct TestResponse {
        status: StatusCode,
        headers: HeaderMap,
        body: Vec<u8>,
    }

    fn poll_now<F: Future>(future: F) -> Option<F::Output> {
        let waker = std::task::Waker::noop();
        let mut cx = Context::from_waker(waker);
        match std::pin::pin!(future).poll(&mut cx) {
            Poll::Ready(output) => Some(output),
            Poll::Pending => None,
        }
    }

    fn collect<B>(response: Response<CompressionBody<B>>) -> TestResponse
    where
        B: Body + Unpin,
        B::Data: bytes::Buf,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let (parts, mut body) = response.into_parts();
        let waker = std::task::Waker::noop();
        let mut cx = Context::from_waker(waker);

        let mut data = Vec::new();
        loop {
            match Pin::new(&mut body).poll_frame(&mut cx) {
                Poll::Ready(None) => break,
                Poll::Ready(Some(frame)) => {
                    if let Ok(bytes) = frame.unwrap().into_data() {
                        data.extend_from_slice(&bytes);
                    }
                }
                Poll::Pending => panic!("unexpected pending from response body"),
            }
        }

        TestResponse {
            status: parts.status,
            headers: parts.headers,
            body: data,
        }
    }

    fn encode_all(codec: Codec, input: &[u8]) -> Vec<u8> {
        let mut encoder = codec.encoder();
        let mut buffer = vec![0u8; 8 * 1024];
        let mut out = Vec::new();

        let mut input_buf = PartialBuffer::new(input);
        while input_buf.written_len() < input.len() {
            let mut output = WriteBuffer::new_initialized(buffer.as_mut_slice());
            encoder.encode(&mut input_buf, &mut output).unwrap();
            let written = output.written_len();
            out.extend_from_slice(&buffer[..written]);
        }
        loop {
            let mut output = WriteBuffer::new_initialized(buffer.as_mut_slice());
            let done = encoder.finish(&mut output).unwrap();
            let written = output.written_len();
            out.extend_from_slice(&buffer[..written]);
            if done {
                break;
            }
        }
        out
    }

    fn get(accept_encoding: Option<&'static str>) -> Request<()> {
        let mut request = Request::new(());
        if let Some(value) = accept_encoding {
            request.headers_mut().insert(
                header::ACCEPT_ENCODING,
                header::HeaderValue::from_static(value),
            );
        }
        request
    }

    #[test]
    fn test_gzip_end_to_end() {
        let res = serve_hello(get(Some("gzip")), "text/plain");

        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.headers.get(header::CONTENT_ENCODING).unwrap(), "gzip");
        assert_eq!(res.headers.get(header::VARY).unwrap(), "accept-encoding");
        assert_eq!(
            res.body,
            encode_all(Codec::Gzip, HELLO.as_bytes())
        );
    }

    #[test]
    fn test_deflate_end_to_end() {
        let res = serve_hello(get(Some("deflate")), "text/plain");

        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(
            res.headers.get(header::CONTENT_ENCODING).unwrap(),
            "deflate"
        );
        assert_eq!(res.headers.get(header::VARY).unwrap(), "accept-encoding");
        assert_eq!(
            res.body,
            encode_all(Codec::Deflate, HELLO.as_bytes())
        );
    }

    #[test]
    fn test_gzip_wins_negotiation() {
        let res = serve_hello(get(Some("gzip, deflate")), "text/plain");

        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.headers.get(header::CONTENT_ENCODING).unwrap(), "gzip");
        assert_eq!(
            res.body,
            encode_all(Codec::Gzip, HELLO.as_bytes())
        );
    }

    #[test]
    fn test_head_request_not_compressed() {
        let mut request = get(Some("gzip, deflate"));
        *request.method_mut() = Method::HEAD;
        let res = serve_hello(request, "text/plain");

        assert_eq!(res.status, StatusCode::OK);
        assert!(res.headers.get(header::CONTENT_ENCODING).is_none());
        assert!(res.headers.get(header::VARY).is_none());
        assert_eq!(res.body, HELLO.as_bytes());
    }

    #[test]
    fn test_unsatisfiable_encoding_rejected() {
        let res = serve_hello(get(Some("not-match")), "text/html");

        assert_eq!(res.status, StatusCode::NOT_ACCEPTABLE);
        assert!(res.headers.get(header::VARY).is_none());
        assert_eq!(res.body, NOT_ACCEPTABLE_BODY.as_bytes());
    }

    #[test]
    fn test_missing_accept_encoding_rejected() {
        // No Accept-Encoding means no encoding is acceptable; a compressible
        // response is therefore unservable.
        let res = serve_hello(get(None), "text/plain");

        assert_eq!(res.status, StatusCode::NOT_ACCEPTABLE);
        assert_eq!(res.body, NOT_ACCEPTABLE_BODY.as_bytes());
    }

    #[test]
    fn test_non_compressible_passthrough() {
        let res = serve_hello(get(Some("gzip")), "image/png");

        assert_eq!(res.status, StatusCode::OK);
        assert!(res.headers.get(header::CONTENT_ENCODING).is_none());
        assert!(res.headers.get(header::VARY).is_none());
        assert_eq!(res.body, HELLO.as_bytes());
    }

    #[test]
    fn test_already_encoded_passthrough() {
        let mut service = CompressionLayer::new().layer(service_fn(|_req: Request<()>| {
            let mut response = Response::new(Full::new(Bytes::from_static(b"pre-encoded")));
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                header::HeaderValue::from_static("text/plain"),
            );
            response.headers_mut().insert(
                header::CONTENT_ENCODING,
                header::HeaderValue::from_static("gzip"),
            );
            std::future::ready(Ok::<_, Infallible>(response))
        }));

        let res = collect(
            poll_now(service.call(get(Some("gzip"))))
                .expect("service future not ready")
                .unwrap(),
        );

        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.headers.get(header::CONTENT_ENCODING).unwrap(), "gzip");
        assert!(res.headers.get(header::VARY).is_none());
        assert_eq!(res.body, b"pre-encoded");
    }

    #[test]
    fn test_inner_service_error_propagates() {
        let mut service = CompressionLayer::new().layer(service_fn(|_req: Request<()>| {
            std::future::ready(Err::<Response<Full<Bytes>>, &str>("inner failed"))
        }));

        let result = poll_now(service.call(get(Some("gzip")))).expect("service future not ready");
        match result {
            Err(e) => assert_eq!(e, "inner failed"),
            Ok(_) => panic!("expected inner error to propagate"),
        }
    }
}

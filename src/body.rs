use crate::codec::Codec;
use bytes::{Buf, Bytes, BytesMut};
use compression_codecs::EncodeV2;
use compression_core::util::{PartialBuffer, WriteBuffer};
use http_body::{Body, Frame};
use pin_project_lite::pin_project;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

const OUTPUT_BUFFER_SIZE: usize = 8 * 1024; // 8KB output buffer

/// Body text served with a 406 when negotiation fails.
pub(crate) const NOT_ACCEPTABLE_BODY: &str = "supported encodings: gzip, deflate";

pin_project! {
    /// A response body that may be compressed.
    ///
    /// This type either compresses an inner body with the negotiated codec,
    /// passes it through unchanged, or serves the fixed negotiation-failure
    /// message.
    #[project = CompressionBodyProj]
    #[allow(missing_docs)]
    pub enum CompressionBody<B> {
        /// Compressed body with encoder.
        Compressed {
            #[pin]
            inner: B,
            state: CompressedBody,
        },
        /// Passthrough body without compression.
        Passthrough {
            #[pin]
            inner: B,
        },
        /// One-shot plaintext body for the 406 rejection.
        NotAcceptable {
            message: Option<Bytes>,
        },
    }
}

/// Encoder and buffers for an actively compressed body.
pub(crate) struct CompressedBody {
    encoder: Box<dyn EncodeV2 + Send>,
    output_buffer: Vec<u8>,
    phase: Phase,
    pending_trailers: Option<http::HeaderMap>,
}

/// Per-response compression phase.
///
/// The encoder is finished exactly once, on the transition out of
/// `Finishing`; trailers buffered from the inner body are only released
/// after the compressed stream is finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Pulling data from the inner body and encoding it.
    Encoding,
    /// Inner body is done; draining the encoder.
    Finishing,
    /// Emitting buffered trailers.
    Trailers,
    /// Stream finalized.
    Done,
}

impl CompressedBody {
    fn new(codec: Codec) -> Self {
        Self {
            encoder: codec.encoder(),
            output_buffer: vec![0u8; OUTPUT_BUFFER_SIZE],
            phase: Phase::Encoding,
            pending_trailers: None,
        }
    }

    fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    /// Polls the inner body and compresses data.
    fn poll_compressed<B>(
        &mut self,
        cx: &mut Context<'_>,
        mut inner: Pin<&mut B>,
    ) -> Poll<Option<Result<Frame<Bytes>, io::Error>>>
    where
        B: Body,
        B::Data: Buf,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        loop {
            match self.phase {
                Phase::Done => return Poll::Ready(None),

                Phase::Trailers => {
                    self.phase = Phase::Done;
                    if let Some(trailers) = self.pending_trailers.take() {
                        return Poll::Ready(Some(Ok(Frame::trailers(trailers))));
                    }
                    return Poll::Ready(None);
                }

                Phase::Finishing => {
                    let mut output =
                        WriteBuffer::new_initialized(self.output_buffer.as_mut_slice());

                    match self.encoder.finish(&mut output) {
                        Ok(done) => {
                            if done {
                                self.phase = if self.pending_trailers.is_some() {
                                    Phase::Trailers
                                } else {
                                    Phase::Done
                                };
                            }
                            let written = output.written_len();
                            if written > 0 {
                                let data = Bytes::copy_from_slice(&self.output_buffer[..written]);
                                return Poll::Ready(Some(Ok(Frame::data(data))));
                            }
                            // Nothing produced this round; keep draining.
                        }
                        Err(e) => {
                            return Poll::Ready(Some(Err(io::Error::other(e))));
                        }
                    }
                }

                Phase::Encoding => {
                    match inner.as_mut().poll_frame(cx) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(None) => {
                            self.phase = Phase::Finishing;
                        }
                        Poll::Ready(Some(Err(e))) => {
                            return Poll::Ready(Some(Err(io::Error::other(e.into()))));
                        }
                        Poll::Ready(Some(Ok(frame))) => match frame.into_data() {
                            Ok(data) => {
                                match self.encode_chunk(&collect_bytes(data)) {
                                    Ok(Some(data)) => {
                                        return Poll::Ready(Some(Ok(Frame::data(data))));
                                    }
                                    // The encoder buffered the whole chunk;
                                    // pull more input before emitting a frame.
                                    Ok(None) => {}
                                    Err(e) => return Poll::Ready(Some(Err(e))),
                                }
                            }
                            Err(frame) => {
                                if let Ok(trailers) = frame.into_trailers() {
                                    self.pending_trailers = Some(trailers);
                                    self.phase = Phase::Finishing;
                                }
                            }
                        },
                    }
                }
            }
        }
    }

    /// Runs a chunk of input through the encoder, returning any output it
    /// produced. `None` means the input was consumed but fully buffered.
    fn encode_chunk(&mut self, input: &[u8]) -> io::Result<Option<Bytes>> {
        let mut input_buf = PartialBuffer::new(input);
        let mut produced = BytesMut::new();

        while input_buf.written_len() < input.len() {
            let consumed_before = input_buf.written_len();
            let mut output = WriteBuffer::new_initialized(self.output_buffer.as_mut_slice());

            self.encoder
                .encode(&mut input_buf, &mut output)
                .map_err(io::Error::other)?;

            let written = output.written_len();
            if written > 0 {
                produced.extend_from_slice(&self.output_buffer[..written]);
            }

            if written == 0 && input_buf.written_len() == consumed_before {
                // No progress on either side; bail rather than spin.
                break;
            }
        }

        if produced.is_empty() {
            Ok(None)
        } else {
            Ok(Some(produced.freeze()))
        }
    }
}

impl<B> CompressionBody<B> {
    /// Creates a compressed body with the given codec.
    pub(crate) fn compressed(inner: B, codec: Codec) -> Self {
        Self::Compressed {
            inner,
            state: CompressedBody::new(codec),
        }
    }

    /// Creates a passthrough body without compression.
    pub(crate) fn passthrough(inner: B) -> Self {
        Self::Passthrough { inner }
    }

    /// Creates the plaintext body for a negotiation-failure response.
    pub(crate) fn not_acceptable() -> Self {
        Self::NotAcceptable {
            message: Some(Bytes::from_static(NOT_ACCEPTABLE_BODY.as_bytes())),
        }
    }
}

impl<B> Body for CompressionBody<B>
where
    B: Body,
    B::Data: Buf,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.project() {
            CompressionBodyProj::Passthrough { inner } => match inner.poll_frame(cx) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(None) => Poll::Ready(None),
                Poll::Ready(Some(Ok(frame))) => {
                    let frame = frame.map_data(|data| collect_bytes(data).freeze());
                    Poll::Ready(Some(Ok(frame)))
                }
                Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(io::Error::other(e.into())))),
            },
            CompressionBodyProj::Compressed { inner, state } => state.poll_compressed(cx, inner),
            CompressionBodyProj::NotAcceptable { message } => {
                Poll::Ready(message.take().map(|data| Ok(Frame::data(data))))
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            CompressionBody::Passthrough { inner } => inner.is_end_stream(),
            CompressionBody::Compressed { state, .. } => state.is_done(),
            CompressionBody::NotAcceptable { message } => message.is_none(),
        }
    }

    fn size_hint(&self) -> http_body::SizeHint {
        match self {
            CompressionBody::Passthrough { inner } => inner.size_hint(),
            // Compressed size is unknown
            CompressionBody::Compressed { .. } => http_body::SizeHint::default(),
            CompressionBody::NotAcceptable { message } => {
                http_body::SizeHint::with_exact(message.as_ref().map_or(0, |m| m.len()) as u64)
            }
        }
    }
}

fn collect_bytes<D: Buf>(mut data: D) -> BytesMut {
    let mut bytes = BytesMut::with_capacity(data.remaining());
    while data.has_remaining() {
        let chunk = data.chunk();
        bytes.extend_from_slice(chunk);
        let len = chunk.len();
        data.advance(len);
    }
    bytes
}

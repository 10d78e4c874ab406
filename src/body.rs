//! Body types shared by requests and responses.
//!
//! Both directions use one boxed body so that the dispatcher can hand hyper a
//! single concrete response type, whether the handler produced buffered JSON
//! or a file stream.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body_util::{BodyExt, Full, combinators::BoxBody};
use hyper::body::Frame;
use tokio::fs::File;
use tokio::io::{AsyncRead, ReadBuf};

use crate::error::BoxError;

/// Streaming HTTP body used for requests and responses.
pub type Body = BoxBody<Bytes, BoxError>;

/// Size of each chunk read from disk by [`FileBody`].
const CHUNK_SIZE: usize = 16 * 1024;

pub(crate) fn full(bytes: impl Into<Bytes>) -> Body {
    Full::new(bytes.into()).map_err(|never| match never {}).boxed()
}

/// Box any hyper-compatible body into [`Body`].
pub(crate) fn boxed<B>(body: B) -> Body
where
    B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<BoxError>,
{
    body.map_err(Into::into).boxed()
}

// ── FileBody ──────────────────────────────────────────────────────────────────

/// A body that reads an open file one chunk at a time, only when hyper polls
/// for the next frame. At most one chunk is held in memory.
pub(crate) struct FileBody {
    file: File,
    buf: Box<[u8]>,
    done: bool,
}

impl FileBody {
    pub(crate) fn new(file: File) -> Self {
        Self { file, buf: vec![0; CHUNK_SIZE].into_boxed_slice(), done: false }
    }
}

impl hyper::body::Body for FileBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, BoxError>>> {
        // Every field is Unpin, so the pin can be dropped.
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        let mut buf = ReadBuf::new(&mut this.buf);
        match Pin::new(&mut this.file).poll_read(cx, &mut buf) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Err(e)) => {
                this.done = true;
                Poll::Ready(Some(Err(e.into())))
            }
            Poll::Ready(Ok(())) if buf.filled().is_empty() => {
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Ready(Ok(())) => {
                Poll::Ready(Some(Ok(Frame::data(Bytes::copy_from_slice(buf.filled())))))
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.done
    }
}

//! Scan passthrough: forwards the upload unchanged while feeding the scanner.

use avgate_storage::ByteStream;
use bytes::Bytes;
use futures::Stream;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_util::sync::PollSender;

/// Stream stage that tees every chunk into a scanning session.
///
/// A chunk is yielded downstream only after the scan feed has accepted its
/// handle (`Bytes` clones share the buffer), so both consumers see the same
/// bytes in the same order and memory stays bounded by the feed depth. The
/// stage never waits for a verdict. If the scanner hangs up early the stage
/// keeps forwarding; the session reports the failure through its verdict.
pub struct ScanPassthrough<'a> {
    inner: ByteStream<'a>,
    feed: Option<PollSender<Bytes>>,
    pending: Option<Bytes>,
    fed_bytes: u64,
}

impl<'a> ScanPassthrough<'a> {
    pub fn new(inner: ByteStream<'a>, feeder: mpsc::Sender<Bytes>) -> Self {
        Self {
            inner,
            feed: Some(PollSender::new(feeder)),
            pending: None,
            fed_bytes: 0,
        }
    }

    /// Bytes accepted by the scan feed so far.
    pub fn fed_bytes(&self) -> u64 {
        self.fed_bytes
    }

    /// Drop the feed half, which signals end of input to the session.
    fn close_feed(&mut self) {
        if self.feed.take().is_some() {
            tracing::trace!(fed_bytes = self.fed_bytes, "Closed scan feed");
        }
    }

    fn poll_feed(&mut self, cx: &mut Context<'_>, chunk: &Bytes) -> Poll<()> {
        // A zero-length chunk terminates clamd's INSTREAM; never feed one.
        if chunk.is_empty() {
            return Poll::Ready(());
        }
        let Some(feed) = self.feed.as_mut() else {
            return Poll::Ready(());
        };

        match feed.poll_reserve(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(Ok(())) => {
                if feed.send_item(chunk.clone()).is_ok() {
                    self.fed_bytes += chunk.len() as u64;
                    return Poll::Ready(());
                }
            }
            Poll::Ready(Err(_)) => {}
        }

        tracing::debug!(fed_bytes = self.fed_bytes, "Scan session stopped accepting data");
        self.feed = None;
        Poll::Ready(())
    }
}

impl Stream for ScanPassthrough<'_> {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if let Some(chunk) = this.pending.take() {
            if this.poll_feed(cx, &chunk).is_pending() {
                this.pending = Some(chunk);
                return Poll::Pending;
            }
            return Poll::Ready(Some(Ok(chunk)));
        }

        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if this.poll_feed(cx, &chunk).is_pending() {
                    this.pending = Some(chunk);
                    return Poll::Pending;
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.close_feed();
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.close_feed();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

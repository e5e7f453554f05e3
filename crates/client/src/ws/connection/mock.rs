//! In-memory transport for tests.
//!
//! The test plays the server: every `open` call hands a [`MockLink`] to the
//! paired [`MockServer`], and the test decides when that link opens, what it
//! receives and when it closes.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use counselflow_shared::TransportError;
use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::{FutureExt, StreamExt};
use url::Url;

use super::{check_scheme, EventSink, Transport, TransportEvent, TransportLink};

/// Create a connected transport/server pair.
pub fn mock_transport() -> (MockTransport, MockServer) {
    let (links_tx, links_rx) = unbounded();
    let opens = Arc::new(AtomicUsize::new(0));
    let fail_next = Arc::new(AtomicBool::new(false));

    let transport = MockTransport {
        links: links_tx,
        opens: opens.clone(),
        fail_next: fail_next.clone(),
    };
    let server = MockServer {
        links: links_rx,
        opens,
        fail_next,
    };
    (transport, server)
}

pub struct MockTransport {
    links: UnboundedSender<MockLink>,
    opens: Arc<AtomicUsize>,
    fail_next: Arc<AtomicBool>,
}

impl Transport for MockTransport {
    fn open(&self, url: &Url, events: EventSink) -> Result<TransportLink, TransportError> {
        check_scheme(url)?;
        self.opens.fetch_add(1, Ordering::SeqCst);

        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(TransportError::open("mock refused connection"));
        }

        let (outbound_tx, outbound_rx) = unbounded();
        let link = MockLink {
            url: url.clone(),
            sink: events,
            outbound: outbound_rx,
        };
        if self.links.unbounded_send(link).is_err() {
            return Err(TransportError::open("mock server dropped"));
        }
        Ok(TransportLink::new(outbound_tx))
    }
}

pub struct MockServer {
    links: UnboundedReceiver<MockLink>,
    opens: Arc<AtomicUsize>,
    fail_next: Arc<AtomicBool>,
}

impl MockServer {
    /// Wait for the client's next connection attempt.
    pub async fn next_link(&mut self) -> MockLink {
        self.links
            .next()
            .await
            .expect("mock transport dropped before opening a link")
    }

    /// A connection attempt that has already been made, if any.
    pub fn try_next_link(&mut self) -> Option<MockLink> {
        self.links.next().now_or_never().flatten()
    }

    /// Calls to `open`, including refused ones.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Make the next `open` fail synchronously.
    pub fn fail_next_open(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

/// Server side of one connection attempt.
pub struct MockLink {
    pub url: Url,
    sink: EventSink,
    outbound: UnboundedReceiver<String>,
}

impl MockLink {
    /// Complete the handshake.
    pub fn open(&self) {
        self.sink.emit(TransportEvent::Opened);
    }

    /// Deliver a text frame to the client.
    pub fn receive(&self, text: &str) {
        self.sink.emit(TransportEvent::Message(text.to_string()));
    }

    pub fn error(&self, detail: &str) {
        self.sink.emit(TransportEvent::Error(detail.to_string()));
    }

    /// Drop the connection from the server side.
    pub fn close(&self) {
        self.sink.emit(TransportEvent::Closed);
    }

    /// Wait for the next frame written by the client. `None` once the client
    /// has closed the link.
    pub async fn next_frame(&mut self) -> Option<String> {
        self.outbound.next().await
    }

    /// Frames already written by the client.
    pub fn drain_frames(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(Some(frame)) = self.outbound.try_next() {
            frames.push(frame);
        }
        frames
    }

    /// True once the client has closed its end, after any pending frames.
    pub fn is_closed(&mut self) -> bool {
        loop {
            match self.outbound.try_next() {
                Ok(Some(_)) => continue,
                Ok(None) => return true,
                Err(_) => return false,
            }
        }
    }
}

//! Native/Desktop WebSocket transport using tokio-tungstenite.

use counselflow_shared::TransportError;
use futures_channel::mpsc::{unbounded, UnboundedReceiver};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use super::{check_scheme, EventSink, Transport, TransportEvent, TransportLink};

/// Transport backed by a tokio-tungstenite client socket.
///
/// Must be used from within a tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteTransport;

impl Transport for TungsteniteTransport {
    fn open(&self, url: &Url, events: EventSink) -> Result<TransportLink, TransportError> {
        check_scheme(url)?;

        let (outbound_tx, outbound_rx) = unbounded();
        tokio::spawn(run_socket(url.to_string(), events, outbound_rx));

        Ok(TransportLink::new(outbound_tx))
    }
}

/// Drive one socket from handshake to close.
async fn run_socket(url: String, events: EventSink, mut outbound: UnboundedReceiver<String>) {
    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            // Same order a browser reports a failed handshake in
            events.emit(TransportEvent::Error(e.to_string()));
            events.emit(TransportEvent::Closed);
            return;
        }
    };
    events.emit(TransportEvent::Opened);

    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            frame = outbound.next() => match frame {
                Some(text) => {
                    if let Err(e) = write.send(Message::text(text)).await {
                        crate::log_error!("WebSocket send failed: {}", e);
                        events.emit(TransportEvent::Error(e.to_string()));
                        break;
                    }
                }
                None => {
                    // The manager dropped the link; nobody is listening anymore.
                    if let Err(e) = write.close().await {
                        crate::log_debug!("WebSocket close handshake failed: {}", e);
                    }
                    return;
                }
            },
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    events.emit(TransportEvent::Message(text.as_str().to_owned()));
                }
                Some(Ok(Message::Close(frame))) => {
                    crate::log_info!("WebSocket received close frame: {:?}", frame);
                    break;
                }
                Some(Ok(_)) => {
                    // Ping/pong is answered by tungstenite; binary frames are not part of the protocol
                }
                Some(Err(e)) => {
                    crate::log_error!("WebSocket read error: {}", e);
                    events.emit(TransportEvent::Error(e.to_string()));
                    break;
                }
                None => break,
            },
        }
    }

    events.emit(TransportEvent::Closed);
}

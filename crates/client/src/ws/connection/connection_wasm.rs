//! WASM/Web WebSocket transport using web_sys::WebSocket.

use counselflow_shared::TransportError;
use futures_channel::mpsc::unbounded;
use futures_util::StreamExt;
use url::Url;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;
use web_sys::{js_sys, CloseEvent, Event, MessageEvent, WebSocket};

use super::{check_scheme, EventSink, Transport, TransportEvent, TransportLink};

/// `WebSocket.readyState` value for an open socket.
const OPEN: u16 = 1;

/// Transport backed by the browser's `WebSocket`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

impl Transport for WebSocketTransport {
    fn open(&self, url: &Url, events: EventSink) -> Result<TransportLink, TransportError> {
        check_scheme(url)?;

        let ws = WebSocket::new(url.as_str())
            .map_err(|e| TransportError::open(format!("{:?}", e)))?;

        let sink = events.clone();
        let onopen = Closure::wrap(Box::new(move |_: Event| {
            sink.emit(TransportEvent::Opened);
        }) as Box<dyn FnMut(Event)>);
        ws.set_onopen(Some(onopen.as_ref().unchecked_ref()));
        onopen.forget();

        let sink = events.clone();
        let onmessage = Closure::wrap(Box::new(move |e: MessageEvent| {
            match e.data().dyn_into::<js_sys::JsString>() {
                Ok(text) => {
                    sink.emit(TransportEvent::Message(text.into()));
                }
                Err(_) => crate::log_debug!("Ignoring non-text WebSocket frame"),
            }
        }) as Box<dyn FnMut(MessageEvent)>);
        ws.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));
        onmessage.forget();

        let sink = events.clone();
        // Browsers deliver a bare `Event` here with no detail to report
        let onerror = Closure::wrap(Box::new(move |e: Event| {
            sink.emit(TransportEvent::Error(format!("WebSocket {} event", e.type_())));
        }) as Box<dyn FnMut(Event)>);
        ws.set_onerror(Some(onerror.as_ref().unchecked_ref()));
        onerror.forget();

        let sink = events;
        let onclose = Closure::wrap(Box::new(move |e: CloseEvent| {
            crate::log_info!("WebSocket closed (code {}): {}", e.code(), e.reason());
            sink.emit(TransportEvent::Closed);
        }) as Box<dyn FnMut(CloseEvent)>);
        ws.set_onclose(Some(onclose.as_ref().unchecked_ref()));
        onclose.forget();

        // Writer task; ends and closes the socket when the link is dropped
        let (outbound_tx, mut outbound_rx) = unbounded::<String>();
        spawn_local(async move {
            while let Some(text) = outbound_rx.next().await {
                if ws.ready_state() != OPEN {
                    crate::log_warn!("WebSocket not open, dropping outbound frame");
                    continue;
                }
                if let Err(e) = ws.send_with_str(&text) {
                    crate::log_error!("WebSocket send failed: {:?}", e);
                }
            }
            let _ = ws.close();
        });

        Ok(TransportLink::new(outbound_tx))
    }
}

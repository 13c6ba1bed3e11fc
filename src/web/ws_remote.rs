use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use gloo::timers::callback::Timeout;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;
use serde_json::{Map, Value};
use web_sys::{CloseEvent, ErrorEvent, Event, MessageEvent, WebSocket};

use kyarashi_core::{decode_frame, encode_frame, ClientFrame, ServerFrame, TableId};

use crate::diag;
use crate::remote::{RemoteError, RemoteHooks, RemoteSubscription, RemoteTable};

const EXISTS_TIMEOUT_MS: u32 = 4_000;

#[allow(dead_code)]
struct WsHandlers {
    onopen: Closure<dyn FnMut(Event)>,
    onmessage: Closure<dyn FnMut(MessageEvent)>,
    onerror: Closure<dyn FnMut(ErrorEvent)>,
    onclose: Closure<dyn FnMut(Event)>,
}

struct WsConnection {
    ws: WebSocket,
    handlers: WsHandlers,
    closing: Rc<Cell<bool>>,
}

/// WebSocket binding of the document service: one long-lived socket per
/// subscribed table carrying JSON frames. Reconnection is the transport's
/// business; this adapter only reports what it sees.
pub struct WsRemote {
    base_url: String,
    connections: Rc<RefCell<HashMap<String, WsConnection>>>,
}

impl WsRemote {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            connections: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    fn table_url(&self, table: &TableId) -> String {
        format!("{}/{}", self.base_url, table.as_str())
    }

    fn send_frame(&self, table: &TableId, frame: &ClientFrame) {
        let ws = {
            let connections = self.connections.borrow();
            let Some(connection) = connections.get(table.as_str()) else {
                diag::warn(&format!("no open stream for table {table}, write dropped"));
                return;
            };
            connection.ws.clone()
        };
        if ws.ready_state() != WebSocket::OPEN {
            diag::warn(&format!("stream for table {table} not open, write dropped"));
            return;
        }
        let Some(raw) = encode_frame(frame) else {
            return;
        };
        let _ = ws.send_with_str(&raw);
    }
}

impl RemoteTable for WsRemote {
    fn subscribe(&self, table: &TableId, hooks: RemoteHooks) -> RemoteSubscription {
        let url = self.table_url(table);
        let ws = match WebSocket::new(&url) {
            Ok(ws) => ws,
            Err(_) => {
                diag::warn(&format!("failed to open stream {url}"));
                (hooks.on_error)(RemoteError::Unavailable { detail: url });
                return RemoteSubscription::new(|| {});
            }
        };
        let closing = Rc::new(Cell::new(false));
        let opened = Rc::new(Cell::new(false));
        let key = table.as_str().to_string();

        let onopen = {
            let ws = ws.clone();
            let opened = Rc::clone(&opened);
            let table = key.clone();
            Closure::wrap(Box::new(move |_event: Event| {
                opened.set(true);
                let frame = ClientFrame::Subscribe {
                    table: table.clone(),
                };
                if let Some(raw) = encode_frame(&frame) {
                    let _ = ws.send_with_str(&raw);
                }
            }) as Box<dyn FnMut(Event)>)
        };
        let onmessage = {
            let hooks = hooks.clone();
            let table = key.clone();
            Closure::wrap(Box::new(move |event: MessageEvent| {
                let Some(raw) = event.data().as_string() else {
                    return;
                };
                match decode_frame::<ServerFrame>(&raw) {
                    Some(ServerFrame::Snapshot {
                        table: for_table,
                        document,
                    }) if for_table == table => {
                        (hooks.on_snapshot)(document);
                    }
                    Some(ServerFrame::Error { code, message }) => {
                        let error = if code == "permission" {
                            RemoteError::PermissionDenied { detail: message }
                        } else {
                            RemoteError::Protocol {
                                detail: format!("{code}: {message}"),
                            }
                        };
                        (hooks.on_error)(error);
                    }
                    Some(_) => {}
                    None => diag::warn("unreadable frame from store"),
                }
            }) as Box<dyn FnMut(MessageEvent)>)
        };
        let onerror = {
            let url = url.clone();
            Closure::wrap(Box::new(move |_event: ErrorEvent| {
                diag::warn(&format!("stream error on {url}"));
            }) as Box<dyn FnMut(ErrorEvent)>)
        };
        let onclose = {
            let hooks = hooks.clone();
            let closing = Rc::clone(&closing);
            let opened = Rc::clone(&opened);
            let connections = Rc::clone(&self.connections);
            let table = key.clone();
            Closure::wrap(Box::new(move |event: Event| {
                connections.borrow_mut().remove(&table);
                if closing.get() {
                    return;
                }
                let detail = match event.dyn_ref::<CloseEvent>() {
                    Some(close) if !close.reason().is_empty() => {
                        format!("closed ({}): {}", close.code(), close.reason())
                    }
                    Some(close) => format!("closed ({})", close.code()),
                    None => "closed".to_string(),
                };
                if !opened.get() {
                    diag::warn(&format!("stream for {table} never opened (bad join code?)"));
                }
                (hooks.on_error)(RemoteError::Unavailable { detail });
            }) as Box<dyn FnMut(Event)>)
        };

        ws.set_onopen(Some(onopen.as_ref().unchecked_ref()));
        ws.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));
        ws.set_onerror(Some(onerror.as_ref().unchecked_ref()));
        ws.set_onclose(Some(onclose.as_ref().unchecked_ref()));

        let previous = self.connections.borrow_mut().insert(
            key.clone(),
            WsConnection {
                ws,
                handlers: WsHandlers {
                    onopen,
                    onmessage,
                    onerror,
                    onclose,
                },
                closing: Rc::clone(&closing),
            },
        );
        if let Some(previous) = previous {
            previous.closing.set(true);
            let _ = previous.ws.close();
        }

        let connections = Rc::clone(&self.connections);
        RemoteSubscription::new(move || {
            closing.set(true);
            if let Some(connection) = connections.borrow_mut().remove(&key) {
                connection.closing.set(true);
                let _ = connection.ws.close();
            }
        })
    }

    fn patch(&self, table: &TableId, fields: Map<String, Value>) {
        self.send_frame(
            table,
            &ClientFrame::Patch {
                table: table.as_str().to_string(),
                fields,
            },
        );
    }

    fn replace(&self, table: &TableId, document: Value) {
        self.send_frame(
            table,
            &ClientFrame::Replace {
                table: table.as_str().to_string(),
                document,
            },
        );
    }

    /// Probes a join code over a short-lived socket. No answer inside the
    /// window counts as "could not verify", never as "does not exist".
    fn check_exists(&self, table: &TableId, on_result: Rc<dyn Fn(Result<bool, RemoteError>)>) {
        let url = self.table_url(table);
        let ws = match WebSocket::new(&url) {
            Ok(ws) => ws,
            Err(_) => {
                on_result(Err(RemoteError::Unavailable { detail: url }));
                return;
            }
        };
        let settled = Rc::new(Cell::new(false));
        let key = table.as_str().to_string();

        let onopen = {
            let ws = ws.clone();
            let table = key.clone();
            Closure::wrap(Box::new(move |_event: Event| {
                let frame = ClientFrame::Exists {
                    table: table.clone(),
                };
                if let Some(raw) = encode_frame(&frame) {
                    let _ = ws.send_with_str(&raw);
                }
            }) as Box<dyn FnMut(Event)>)
        };
        let onmessage = {
            let ws = ws.clone();
            let settled = Rc::clone(&settled);
            let on_result = Rc::clone(&on_result);
            let table = key.clone();
            Closure::wrap(Box::new(move |event: MessageEvent| {
                let Some(raw) = event.data().as_string() else {
                    return;
                };
                if let Some(ServerFrame::Exists {
                    table: for_table,
                    exists,
                }) = decode_frame::<ServerFrame>(&raw)
                {
                    if for_table != table || settled.get() {
                        return;
                    }
                    settled.set(true);
                    on_result(Ok(exists));
                    let _ = ws.close();
                }
            }) as Box<dyn FnMut(MessageEvent)>)
        };
        let onclose = {
            let settled = Rc::clone(&settled);
            let on_result = Rc::clone(&on_result);
            Closure::wrap(Box::new(move |_event: Event| {
                if settled.get() {
                    return;
                }
                settled.set(true);
                on_result(Err(RemoteError::Unavailable {
                    detail: "probe stream closed".to_string(),
                }));
            }) as Box<dyn FnMut(Event)>)
        };

        ws.set_onopen(Some(onopen.as_ref().unchecked_ref()));
        ws.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));
        ws.set_onclose(Some(onclose.as_ref().unchecked_ref()));

        {
            let ws = ws.clone();
            let settled = Rc::clone(&settled);
            Timeout::new(EXISTS_TIMEOUT_MS, move || {
                if settled.get() {
                    return;
                }
                settled.set(true);
                let _ = ws.close();
                on_result(Err(RemoteError::Timeout));
            })
            .forget();
        }

        // The probe socket is short-lived; leaking its handlers is the
        // price of not owning a registry for them.
        onopen.forget();
        onmessage.forget();
        onclose.forget();
    }
}

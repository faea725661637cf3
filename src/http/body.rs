//! Request body accumulation.
//!
//! Handlers that need a body mark the request `DispatchedStreaming`; the
//! connection task then feeds every body event here. At end of stream the
//! buffer is parsed as JSON and handed to the config handler.

use std::error::Error;
use std::sync::Arc;

use http_body_util::LengthLimitError;
use serde_json::Value;

use crate::admin::handlers;
use crate::http::request::ApiRequest;
use crate::http::response::{respond_with_413, respond_with_422};
use crate::http::server::ApiServer;
use crate::net::ClientInfo;

/// One step of a request body stream.
pub enum BodyEvent<'a> {
    Data(&'a [u8]),
    End,
    Error(&'a (dyn Error + 'static)),
}

/// What the transport should do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelResult {
    /// Bytes consumed from the event.
    pub consumed: usize,
    /// Stop feeding events.
    pub end: bool,
}

impl ChannelResult {
    fn consumed(consumed: usize) -> Self {
        Self { consumed, end: false }
    }

    fn done() -> Self {
        Self { consumed: 0, end: true }
    }
}

impl ApiServer {
    pub fn on_request_body(&self, client: &ClientInfo, req: &Arc<ApiRequest>, event: BodyEvent<'_>) -> ChannelResult {
        if req.body_finished() {
            tracing::warn!(client = %client, path = %req.path(), "Body event after end of stream ignored");
            return ChannelResult::done();
        }

        match event {
            BodyEvent::Data(data) => {
                // Keep draining the stream even if the request has concluded.
                if !req.ended() {
                    req.append_body(data);
                }
                ChannelResult::consumed(data.len())
            }
            BodyEvent::End => {
                req.finish_body();
                if !req.ended() {
                    self.on_body_complete(client, req);
                }
                ChannelResult::done()
            }
            BodyEvent::Error(error) => {
                req.finish_body();
                req.set_want_keep_alive(false);
                if exceeds_size_limit(error) && !req.ended() {
                    tracing::warn!(client = %client, path = %req.path(), "Request body exceeds the size limit");
                    respond_with_413(req);
                } else {
                    tracing::warn!(client = %client, path = %req.path(), error = %error, "Error receiving request body");
                    req.abort();
                }
                ChannelResult::done()
            }
        }
    }

    fn on_body_complete(&self, client: &ClientInfo, req: &Arc<ApiRequest>) {
        match req.with_body(|body| serde_json::from_slice::<Value>(body)) {
            Ok(json) => {
                req.set_json_body(json);
                if let Err(e) = handlers::process_config_body(self, req) {
                    self.handle_error(client, req, &e);
                }
            }
            Err(e) => respond_with_422(req, &e.to_string()),
        }
    }
}

/// Whether a body stream error came from the body size limit.
fn exceeds_size_limit(error: &(dyn Error + 'static)) -> bool {
    let mut current = Some(error);
    while let Some(e) = current {
        if e.is::<LengthLimitError>() {
            return true;
        }
        current = e.source();
    }
    false
}

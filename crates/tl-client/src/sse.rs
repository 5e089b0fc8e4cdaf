//! Assembly status updates over server-sent events.
//!
//! The update stream emits `text/event-stream` records. Unnamed events carry
//! a lifecycle keyword as their data (`assembly_finished`, ...); named events
//! carry JSON payloads.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::client::Transloadit;
use crate::error::{TransloaditError, TransloaditResult};
use crate::listener::AssemblyListener;

/// Upper bound of the reconnect backoff.
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(3);
const INITIAL_RECONNECT_DELAY: Duration = Duration::from_millis(250);

/// One dispatched event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event name; `message` when the record has no `event:` field.
    pub event: String,
    pub data: String,
    pub id: Option<String>,
}

/// Incremental `text/event-stream` parser.
///
/// Accepts arbitrary byte chunks; lines may be terminated by LF or CRLF.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and collect every event completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }

        events
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent {
            event: event.filter(|e| !e.is_empty()).unwrap_or_else(|| "message".to_string()),
            data,
            id: self.id.clone(),
        })
    }
}

/// Routes stream events to a listener.
pub(crate) struct EventDispatcher {
    client: Transloadit,
    listener: Arc<dyn AssemblyListener>,
    ssl_url: String,
    finished: bool,
}

impl EventDispatcher {
    pub(crate) fn new(client: Transloadit, listener: Arc<dyn AssemblyListener>, ssl_url: impl Into<String>) -> Self {
        Self {
            client,
            listener,
            ssl_url: ssl_url.into(),
            finished: false,
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished
    }

    pub(crate) async fn dispatch(&mut self, event: &SseEvent) {
        debug!(event = %event.event, data = %event.data, "Assembly event");

        match event.event.as_str() {
            "message" => match event.data.as_str() {
                "assembly_finished" => self.finish().await,
                "assembly_upload_meta_data_extracted" => self.listener.on_metadata_extracted(),
                "assembly_uploading_finished" => self.listener.on_assembly_upload_finished(),
                other => debug!(data = %other, "Ignoring unknown assembly message"),
            },
            "assembly_upload_finished" => {
                if let Some(json) = parse_json(event) {
                    self.listener.on_file_upload_finished(&json);
                }
            }
            "assembly_result_finished" => {
                if let Some(json) = parse_json(event) {
                    self.listener.on_assembly_result_finished(&json);
                }
            }
            "assembly_execution_progress" => {
                if let Some(json) = parse_json(event) {
                    self.listener.on_assembly_progress(&json);
                }
            }
            "assembly_error" => {
                if self.finished {
                    debug!("Ignoring assembly error reported after finish");
                } else {
                    self.listener.on_error(&TransloaditError::request(event.data.clone()));
                }
            }
            other => debug!(event = %other, "Ignoring unknown assembly event"),
        }
    }

    async fn finish(&mut self) {
        self.finished = true;
        match self.client.get_assembly_by_url(&self.ssl_url).await {
            Ok(response) => self.listener.on_assembly_finished(&response),
            Err(e) => {
                warn!(url = %self.ssl_url, error = %e, "Failed to fetch finished assembly status");
                self.listener.on_error(&TransloaditError::empty_response(format!(
                    "no assembly response after finish: {}",
                    e
                )));
            }
        }
    }
}

fn parse_json(event: &SseEvent) -> Option<Value> {
    match serde_json::from_str(&event.data) {
        Ok(json) => Some(json),
        Err(e) => {
            warn!(event = %event.event, error = %e, "Malformed event payload");
            None
        }
    }
}

/// Follow the update stream until it closes after the assembly finished.
///
/// Connection failures before the finish are retried with a backoff capped at
/// three seconds; after `max_reconnects` consecutive failures the error is
/// reported to the listener.
pub(crate) async fn run_event_stream(
    client: Transloadit,
    stream_url: String,
    ssl_url: String,
    listener: Arc<dyn AssemblyListener>,
) {
    let max_reconnects = client.config.sse_max_reconnects;
    let mut dispatcher = EventDispatcher::new(client.clone(), Arc::clone(&listener), ssl_url);
    let mut failures = 0u32;

    info!(url = %stream_url, "Listening for assembly events");

    loop {
        let result = follow_stream(&client, &stream_url, &mut dispatcher).await;

        if dispatcher.is_finished() {
            if let Err(e) = result {
                debug!(error = %e, "Event stream ended after finish");
            }
            info!(url = %stream_url, "Assembly event stream closed");
            return;
        }

        let error = match result {
            Ok(received) => {
                if received > 0 {
                    failures = 0;
                }
                TransloaditError::request("Event stream closed before the assembly finished")
            }
            Err(e) => e,
        };

        failures += 1;
        if failures > max_reconnects {
            warn!(url = %stream_url, error = %error, failures, "Giving up on assembly event stream");
            listener.on_error(&error);
            return;
        }

        let delay = reconnect_delay(failures);
        debug!(url = %stream_url, error = %error, delay_ms = delay.as_millis() as u64, "Reconnecting event stream");
        tokio::time::sleep(delay).await;
    }
}

/// Read one connection to completion; returns the number of events seen.
async fn follow_stream(
    client: &Transloadit,
    url: &str,
    dispatcher: &mut EventDispatcher,
) -> TransloaditResult<usize> {
    let response = client
        .http
        .get(url)
        .header("Accept", "text/event-stream")
        .header("Transloadit-Client", client.version_info())
        .send()
        .await?
        .error_for_status()?;

    let mut parser = SseParser::new();
    let mut stream = response.bytes_stream();
    let mut received = 0;

    while let Some(chunk) = stream.next().await {
        for event in parser.feed(&chunk?) {
            received += 1;
            dispatcher.dispatch(&event).await;
        }
    }

    Ok(received)
}

fn reconnect_delay(failures: u32) -> Duration {
    let factor = 2u32.saturating_pow(failures.saturating_sub(1));
    INITIAL_RECONNECT_DELAY
        .saturating_mul(factor)
        .min(MAX_RECONNECT_DELAY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parser_default_event_name() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"data: assembly_finished\n\n");
        assert_eq!(
            events,
            vec![SseEvent {
                event: "message".to_string(),
                data: "assembly_finished".to_string(),
                id: None,
            }]
        );
    }

    #[test]
    fn test_parser_named_multiline_crlf() {
        let mut parser = SseParser::new();
        let events = parser.feed(b": keepalive\r\nevent: assembly_result_finished\r\nid: 7\r\ndata: [\"resize\",\r\ndata: {}]\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "assembly_result_finished");
        assert_eq!(events[0].data, "[\"resize\",\n{}]");
        assert_eq!(events[0].id.as_deref(), Some("7"));
    }

    #[test]
    fn test_parser_split_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"event: assembly_execution_pro").is_empty());
        assert!(parser.feed(b"gress\ndata: {\"a\"").is_empty());
        let events = parser.feed(b":1}\n\ndata: x\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "assembly_execution_progress");
        assert_eq!(events[0].data, "{\"a\":1}");

        let events = parser.feed(b"\n");
        assert_eq!(events[0].event, "message");
        assert_eq!(events[0].data, "x");
    }

    #[test]
    fn test_parser_skips_empty_records() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"event: ping\n\n\n").is_empty());
        let events = parser.feed(b"data\n\n");
        assert_eq!(events[0].event, "message");
        assert_eq!(events[0].data, "");
    }

    #[test]
    fn test_reconnect_delay_capped() {
        assert_eq!(reconnect_delay(1), Duration::from_millis(250));
        assert_eq!(reconnect_delay(2), Duration::from_millis(500));
        assert_eq!(reconnect_delay(4), Duration::from_secs(2));
        assert_eq!(reconnect_delay(5), MAX_RECONNECT_DELAY);
        assert_eq!(reconnect_delay(40), MAX_RECONNECT_DELAY);
    }
}

//! Server-sent event consumption.
//!
//! [`SseDecoder`] turns arbitrary `text/event-stream` chunks into events; [`EventStream`]
//! drives it from an HTTP response. Connection loss ends the stream for good: there is
//! no `Last-Event-ID` resume.

use crate::error::{rejection_reason, ClientError, ClientResult};
use futures_util::stream::{BoxStream, Stream, StreamExt};
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use std::collections::VecDeque;
use tracing::{debug, info};

/// One dispatched server-sent event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// `event:` field, when the server named the event type.
    pub event: Option<String>,
    /// All `data:` lines of the event, joined with `\n`.
    pub data: String,
    pub id: Option<String>,
    pub retry: Option<u64>,
}

#[derive(Debug, Default)]
struct PendingEvent {
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
    retry: Option<u64>,
}

impl PendingEvent {
    /// Events without any data line are discarded.
    fn take(&mut self) -> Option<SseEvent> {
        let pending = std::mem::take(self);
        if pending.data.is_empty() {
            return None;
        }
        Some(SseEvent {
            event: pending.event,
            data: pending.data.join("\n"),
            id: pending.id,
            retry: pending.retry,
        })
    }
}

/// Incremental `text/event-stream` decoder.
///
/// Lines end at `\n`, `\r\n` or `\r`, and may be split anywhere across chunks,
/// including inside a UTF-8 sequence: bytes are only decoded once a line is complete.
/// A byte-order mark at the very start of the stream is dropped.
#[derive(Debug, Default)]
pub struct SseDecoder {
    line: Vec<u8>,
    pending: PendingEvent,
    after_cr: bool,
    past_first_line: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns the events it completed, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        let mut events = Vec::new();
        for &byte in chunk {
            if self.after_cr {
                self.after_cr = false;
                if byte == b'\n' {
                    continue;
                }
            }
            match byte {
                b'\n' => self.end_line(&mut events),
                b'\r' => {
                    self.end_line(&mut events);
                    self.after_cr = true;
                }
                _ => self.line.push(byte),
            }
        }
        events
    }

    /// Forget any partial line or event.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn end_line(&mut self, events: &mut Vec<SseEvent>) {
        let mut line = String::from_utf8_lossy(&self.line).into_owned();
        self.line.clear();
        if !self.past_first_line {
            self.past_first_line = true;
            if let Some(rest) = line.strip_prefix('\u{feff}') {
                line = rest.to_string();
            }
        }

        if line.is_empty() {
            events.extend(self.pending.take());
            return;
        }
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line.as_str(), ""),
        };
        match field {
            "data" => self.pending.data.push(value.to_string()),
            "event" => self.pending.event = Some(value.to_string()),
            "id" => self.pending.id = Some(value.to_string()),
            "retry" => self.pending.retry = value.trim().parse().ok(),
            _ => {}
        }
    }
}

/// A live event stream. `next_event` returns `None` once the server closes it.
pub struct EventStream {
    chunks: BoxStream<'static, ClientResult<Vec<u8>>>,
    decoder: SseDecoder,
    queue: VecDeque<SseEvent>,
    finished: bool,
}

impl EventStream {
    /// Open `url` with the given query and start decoding.
    pub async fn connect(
        client: &reqwest::Client,
        url: &str,
        query: &[(&str, &str)],
    ) -> ClientResult<Self> {
        info!("opening event stream {}", url);
        let response = client
            .get(url)
            .query(query)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Rejected {
                status: status.as_u16(),
                reason: rejection_reason(&body, "Event stream refused"),
            });
        }

        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(ClientError::from));
        Ok(Self::from_chunks(chunks))
    }

    /// Decode an already-open byte stream.
    pub fn from_chunks<S>(chunks: S) -> Self
    where
        S: Stream<Item = ClientResult<Vec<u8>>> + Send + 'static,
    {
        Self {
            chunks: chunks.boxed(),
            decoder: SseDecoder::new(),
            queue: VecDeque::new(),
            finished: false,
        }
    }

    /// Next decoded event. An error is terminal: later calls return `None`.
    pub async fn next_event(&mut self) -> Option<ClientResult<SseEvent>> {
        loop {
            if let Some(event) = self.queue.pop_front() {
                return Some(Ok(event));
            }
            if self.finished {
                return None;
            }
            match self.chunks.next().await {
                Some(Ok(chunk)) => {
                    let events = self.decoder.feed(&chunk);
                    debug!(bytes = chunk.len(), events = events.len(), "event stream chunk");
                    self.queue.extend(events);
                }
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(e));
                }
                None => {
                    debug!("event stream closed by server");
                    self.finished = true;
                }
            }
        }
    }
}

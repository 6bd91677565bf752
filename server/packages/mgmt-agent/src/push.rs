//! Unsolicited events forwarded to the controller.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::sse::Event;
use futures::{stream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::dto::UnitInfo;
use crate::host::{BusEvent, LogRecord};

pub const DEFAULT_RING_SIZE: usize = 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "camelCase")]
pub enum PushEvent {
    Log(LogRecord),
    Event(BusEvent),
    LeakAlert(Vec<UnitInfo>),
    Stdout(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    pub sequence: u64,
    pub timestamp: String,
    #[serde(flatten)]
    pub event: PushEvent,
}

/// Bounded replay ring plus live fan-out.
#[derive(Clone)]
pub struct PushChannel {
    inner: Arc<PushInner>,
}

struct PushInner {
    sender: broadcast::Sender<PushMessage>,
    ring: Mutex<VecDeque<PushMessage>>,
    ring_size: usize,
    sequence: AtomicU64,
}

impl PushChannel {
    pub fn new(ring_size: usize) -> Self {
        let (sender, _rx) = broadcast::channel(512);
        Self {
            inner: Arc::new(PushInner {
                sender,
                ring: Mutex::new(VecDeque::with_capacity(ring_size)),
                ring_size: ring_size.max(1),
                sequence: AtomicU64::new(0),
            }),
        }
    }

    pub fn publish(&self, event: PushEvent) -> u64 {
        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| String::new());
        let mut ring = self
            .inner
            .ring
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Sequence is taken under the ring lock so replay order matches it.
        let sequence = self.inner.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let message = PushMessage {
            sequence,
            timestamp,
            event,
        };
        ring.push_back(message.clone());
        while ring.len() > self.inner.ring_size {
            ring.pop_front();
        }
        let _ = self.inner.sender.send(message);
        sequence
    }

    pub fn subscribe(&self, last_event_id: Option<u64>) -> (Vec<PushMessage>, broadcast::Receiver<PushMessage>) {
        let ring = self
            .inner
            .ring
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let replay = ring
            .iter()
            .filter(|message| match last_event_id {
                Some(last_event_id) => message.sequence > last_event_id,
                None => true,
            })
            .cloned()
            .collect();
        (replay, self.inner.sender.subscribe())
    }

    pub fn sse_stream(
        &self,
        last_event_id: Option<u64>,
    ) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
        let (replay, rx) = self.subscribe(last_event_id);
        let replay_stream = stream::iter(replay.into_iter().map(|message| Ok(to_sse(&message))));
        let live_stream = BroadcastStream::new(rx).filter_map(|item| async move {
            match item {
                Ok(message) => Some(Ok(to_sse(&message))),
                Err(_) => None,
            }
        });
        replay_stream.chain(live_stream)
    }
}

fn to_sse(message: &PushMessage) -> Event {
    let kind = match &message.event {
        PushEvent::Log(_) => "log",
        PushEvent::Event(_) => "event",
        PushEvent::LeakAlert(_) => "leakAlert",
        PushEvent::Stdout(_) => "stdout",
    };
    Event::default()
        .event(kind)
        .id(message.sequence.to_string())
        .data(serde_json::to_string(message).unwrap_or_default())
}

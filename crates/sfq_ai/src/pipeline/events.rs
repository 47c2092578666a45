use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

pub const EVENT_TYPE: &str = "question_update";

/// Progress update for one question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestionEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub run_id: i64,
    pub question_id: i64,
    pub stage: String,
    pub status: String,
    pub payload: serde_json::Value,
    pub metrics: serde_json::Value,
}

impl QuestionEvent {
    pub fn new(run_id: i64, question_id: i64, stage: &str, status: &str) -> Self {
        Self {
            kind: EVENT_TYPE.to_string(),
            run_id,
            question_id,
            stage: stage.to_string(),
            status: status.to_string(),
            payload: serde_json::json!({}),
            metrics: serde_json::json!({}),
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_metrics(mut self, metrics: serde_json::Value) -> Self {
        self.metrics = metrics;
        self
    }
}

pub fn run_channel(run_id: i64) -> String {
    format!("run:{run_id}")
}

/// Best-effort fan-out. Publishing never fails the caller.
pub trait EventSink: Send + Sync {
    fn publish(&self, channel: &str, event: &QuestionEvent);
}

/// Events buffered per subscriber before newer ones are dropped.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

/// In-process pub/sub keyed by channel name. Each subscriber gets a bounded queue.
#[derive(Debug)]
pub struct ChannelSink {
    capacity: usize,
    subscribers: Mutex<HashMap<String, Vec<SyncSender<QuestionEvent>>>>,
}

impl Default for ChannelSink {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_SUBSCRIBER_CAPACITY)
    }
}

impl ChannelSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    pub fn subscribe(&self, channel: &str) -> Receiver<QuestionEvent> {
        let (tx, rx) = mpsc::sync_channel(self.capacity);
        self.subscribers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .entry(channel.to_string())
            .or_default()
            .push(tx);
        rx
    }
}

impl EventSink for ChannelSink {
    fn publish(&self, channel: &str, event: &QuestionEvent) {
        let mut subs = self.subscribers.lock().unwrap_or_else(|p| p.into_inner());
        let Some(list) = subs.get_mut(channel) else {
            tracing::debug!(channel, stage = %event.stage, "no subscribers; event dropped");
            return;
        };
        let before = list.len();
        // Full queues lose this event; disconnected receivers are forgotten.
        list.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::debug!(channel, stage = %event.stage, "subscriber queue full; event dropped");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
        if list.len() < before {
            tracing::debug!(channel, dropped = before - list.len(), "pruned closed subscribers");
        }
        if list.is_empty() {
            subs.remove(channel);
        }
    }
}

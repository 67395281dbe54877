//! In-process event bus for the coordination core.
//!
//! Observability only: the core has no callbacks and no outbound network.
//! Every state transition publishes an envelope here so the server can fan
//! them out over SSE and operators can tail what the state machine did.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

pub mod topics;

/// Minimal event envelope (RFC3339 time).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub time: String,
    pub kind: String,
    pub payload: Value,
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    delivered: AtomicU64,
    no_receivers: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BusStats {
    pub published: u64,
    pub delivered: u64,
    pub no_receivers: u64,
    pub receivers: usize,
}

/// Broadcast bus with publish counters and a bounded replay buffer so late
/// subscribers can catch up on recent transitions.
#[derive(Clone)]
pub struct Bus {
    tx: broadcast::Sender<Envelope>,
    counters: Arc<Counters>,
    replay: Arc<Mutex<VecDeque<Envelope>>>,
    replay_cap: usize,
}

impl Bus {
    pub fn new(capacity: usize) -> Self {
        Self::new_with_replay(capacity, 256)
    }

    pub fn new_with_replay(capacity: usize, replay_cap: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self {
            tx,
            counters: Arc::new(Counters::default()),
            replay: Arc::new(Mutex::new(VecDeque::with_capacity(replay_cap))),
            replay_cap,
        }
    }

    pub fn publish<T: Serialize>(&self, kind: &str, payload: &T) {
        let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let val =
            serde_json::to_value(payload).unwrap_or_else(|_| serde_json::json!({"_ser": "error"}));
        let env = Envelope {
            time: now,
            kind: kind.to_string(),
            payload: val,
        };
        self.counters.published.fetch_add(1, Ordering::Relaxed);
        match self.tx.send(env.clone()) {
            Ok(n) => {
                self.counters.delivered.fetch_add(n as u64, Ordering::Relaxed);
            }
            Err(_) => {
                self.counters.no_receivers.fetch_add(1, Ordering::Relaxed);
            }
        }
        let mut rb = self.replay.lock().unwrap();
        if rb.len() == self.replay_cap {
            rb.pop_front();
        }
        rb.push_back(env);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    /// Forward only events whose kind starts with one of the prefixes.
    pub fn subscribe_filtered(
        &self,
        prefixes: Vec<String>,
        capacity: Option<usize>,
    ) -> broadcast::Receiver<Envelope> {
        let (tx, rx) = broadcast::channel(capacity.unwrap_or(128));
        let mut src = self.tx.subscribe();
        tokio::spawn(async move {
            while let Ok(env) = src.recv().await {
                if prefixes.iter().any(|p| env.kind.starts_with(p)) {
                    let _ = tx.send(env);
                }
                if tx.receiver_count() == 0 {
                    break;
                }
            }
        });
        rx
    }

    /// Up to `n` recent envelopes, oldest first.
    pub fn replay(&self, n: usize) -> Vec<Envelope> {
        let rb = self.replay.lock().unwrap();
        let len = rb.len();
        let take = n.min(len);
        rb.iter().skip(len - take).cloned().collect()
    }

    pub fn stats(&self) -> BusStats {
        BusStats {
            published: self.counters.published.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            no_receivers: self.counters.no_receivers.load(Ordering::Relaxed),
            receivers: self.tx.receiver_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_subscribers_and_replay() {
        let bus = Bus::new_with_replay(8, 4);
        let mut rx = bus.subscribe();
        bus.publish(topics::TOPIC_JOBS_SUBMITTED, &serde_json::json!({"id": "aj-1"}));
        let env = rx.recv().await.unwrap();
        assert_eq!(env.kind, topics::TOPIC_JOBS_SUBMITTED);
        assert_eq!(env.payload["id"], "aj-1");
        assert_eq!(bus.replay(10).len(), 1);
        let stats = bus.stats();
        assert_eq!(stats.published, 1);
    }

    #[tokio::test]
    async fn replay_buffer_is_bounded() {
        let bus = Bus::new_with_replay(8, 2);
        for i in 0..5 {
            bus.publish("skill.test", &serde_json::json!({"i": i}));
        }
        let replay = bus.replay(10);
        assert_eq!(replay.len(), 2);
        assert_eq!(replay[0].payload["i"], 3);
        assert_eq!(replay[1].payload["i"], 4);
    }

    #[tokio::test]
    async fn filtered_subscription_drops_other_kinds() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe_filtered(vec!["skill.jobs.".into()], None);
        tokio::task::yield_now().await;
        bus.publish("skill.index.updated", &serde_json::json!({}));
        bus.publish("skill.jobs.completed", &serde_json::json!({"id": "aj-2"}));
        let env = rx.recv().await.unwrap();
        assert_eq!(env.kind, "skill.jobs.completed");
    }
}

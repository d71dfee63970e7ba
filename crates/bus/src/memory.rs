//! In-memory `StreamingBus` fake for tests — no real TTL sweeper, expiry
//! is checked lazily on read, same trick the teacher's in-memory fakes use
//! for the adapters that would otherwise need a background task.

use crate::error::BusError;
use crate::{BusSubscription, StreamingBus};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

struct State {
    kv: HashMap<String, Entry>,
    lists: HashMap<String, Vec<serde_json::Value>>,
    channels: HashMap<String, broadcast::Sender<(String, String)>>,
}

impl State {
    fn is_live(entry: &Entry) -> bool {
        match entry.expires_at {
            Some(at) => at > Instant::now(),
            None => true,
        }
    }
}

/// In-memory fake for [`StreamingBus`]. Cheap to clone — state lives
/// behind an `Arc<Mutex<_>>`, same shape as every other in-memory fake
/// in this workspace.
#[derive(Clone)]
pub struct InMemoryBus {
    state: Arc<Mutex<State>>,
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                kv: HashMap::new(),
                lists: HashMap::new(),
                channels: HashMap::new(),
            })),
        }
    }
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StreamingBus for InMemoryBus {
    type Subscription = InMemorySubscription;

    async fn try_acquire_lock(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool, BusError> {
        let mut state = self.state.lock();
        if let Some(existing) = state.kv.get(key) {
            if State::is_live(existing) {
                return Ok(false);
            }
        }
        state.kv.insert(
            key.to_string(),
            Entry {
                value: holder.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn lock_holder(&self, key: &str) -> Result<Option<String>, BusError> {
        let state = self.state.lock();
        Ok(state
            .kv
            .get(key)
            .filter(|entry| State::is_live(entry))
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BusError> {
        let mut state = self.state.lock();
        state.kv.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BusError> {
        let mut state = self.state.lock();
        state.kv.remove(key);
        state.lists.remove(key);
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), BusError> {
        let mut state = self.state.lock();
        if let Some(entry) = state.kv.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn list_append(&self, key: &str, value: serde_json::Value) -> Result<(), BusError> {
        let mut state = self.state.lock();
        state.lists.entry(key.to_string()).or_default().push(value);
        Ok(())
    }

    async fn list_range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<serde_json::Value>, BusError> {
        let state = self.state.lock();
        let list = match state.lists.get(key) {
            Some(list) => list,
            None => return Ok(Vec::new()),
        };
        let len = list.len() as i64;
        let normalize = |idx: i64| -> i64 {
            if idx < 0 {
                (len + idx).max(0)
            } else {
                idx.min(len)
            }
        };
        let start = normalize(start);
        let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
        if start > stop || start >= len {
            return Ok(Vec::new());
        }
        Ok(list[start as usize..=(stop.max(0) as usize).min(list.len() - 1)].to_vec())
    }

    async fn list_len(&self, key: &str) -> Result<usize, BusError> {
        let state = self.state.lock();
        Ok(state.lists.get(key).map(|l| l.len()).unwrap_or(0))
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BusError> {
        let state = self.state.lock();
        if let Some(sender) = state.channels.get(channel) {
            // No subscribers is not an error — matches redis PUBLISH semantics.
            let _ = sender.send((channel.to_string(), payload.to_string()));
        }
        Ok(())
    }

    async fn subscribe(&self, channels: &[String]) -> Result<Self::Subscription, BusError> {
        let mut state = self.state.lock();
        let mut receivers = Vec::with_capacity(channels.len());
        for channel in channels {
            let sender = state
                .channels
                .entry(channel.clone())
                .or_insert_with(|| broadcast::channel(256).0)
                .clone();
            receivers.push(sender.subscribe());
        }
        Ok(InMemorySubscription { receivers })
    }
}

pub struct InMemorySubscription {
    receivers: Vec<broadcast::Receiver<(String, String)>>,
}

#[async_trait]
impl BusSubscription for InMemorySubscription {
    async fn next_message(&mut self, timeout: Duration) -> Result<Option<(String, String)>, BusError> {
        if self.receivers.is_empty() {
            tokio::time::sleep(timeout).await;
            return Ok(None);
        }
        let mut futs: Vec<_> = self
            .receivers
            .iter_mut()
            .map(|rx| Box::pin(rx.recv()))
            .collect();
        let wait = async {
            loop {
                let (result, _, rest) = futures::future::select_all(futs.into_iter()).await;
                match result {
                    Ok(msg) => return Some(msg),
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        futs = rest;
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        };
        match tokio::time::timeout(timeout, wait).await {
            Ok(msg) => Ok(msg),
            Err(_) => Ok(None),
        }
    }

    async fn unsubscribe(&mut self) -> Result<(), BusError> {
        self.receivers.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lock_is_exclusive_until_expiry() {
        let bus = InMemoryBus::new();
        assert!(bus.try_acquire_lock("k", "a", Duration::from_millis(50)).await.unwrap());
        assert!(!bus.try_acquire_lock("k", "b", Duration::from_secs(5)).await.unwrap());
        assert_eq!(bus.lock_holder("k").await.unwrap(), Some("a".to_string()));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(bus.try_acquire_lock("k", "b", Duration::from_secs(5)).await.unwrap());
        assert_eq!(bus.lock_holder("k").await.unwrap(), Some("b".to_string()));
    }

    #[tokio::test]
    async fn list_append_and_range_match_redis_negative_index_semantics() {
        let bus = InMemoryBus::new();
        for i in 0..5 {
            bus.list_append("l", serde_json::json!(i)).await.unwrap();
        }
        let all = bus.list_range("l", 0, -1).await.unwrap();
        assert_eq!(all.len(), 5);
        let tail = bus.list_range("l", -2, -1).await.unwrap();
        assert_eq!(tail, vec![serde_json::json!(3), serde_json::json!(4)]);
    }

    #[tokio::test]
    async fn publish_delivers_to_subscriber() {
        let bus = InMemoryBus::new();
        let mut sub = bus.subscribe(&["chan".to_string()]).await.unwrap();
        bus.publish("chan", "hello").await.unwrap();
        let msg = sub.next_message(Duration::from_secs(1)).await.unwrap();
        assert_eq!(msg, Some(("chan".to_string(), "hello".to_string())));
    }

    #[tokio::test]
    async fn next_message_times_out_with_no_traffic() {
        let bus = InMemoryBus::new();
        let mut sub = bus.subscribe(&["chan".to_string()]).await.unwrap();
        let msg = sub.next_message(Duration::from_millis(20)).await.unwrap();
        assert_eq!(msg, None);
    }
}

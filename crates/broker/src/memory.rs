//! In-memory `TaskBroker` fake for tests. Models at-least-once
//! redelivery: an unacked job goes back on the queue once its visibility
//! timeout elapses, same shape as a Redis Streams pending-entries list.

use crate::error::BrokerError;
use crate::{Delivery, TaskBroker};
use async_trait::async_trait;
use orc_core::RunStartJob;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Pending {
    job: RunStartJob,
    visible_at: Instant,
}

struct State {
    queue: VecDeque<RunStartJob>,
    in_flight: HashMap<String, Pending>,
    next_tag: u64,
    visibility_timeout: Duration,
}

#[derive(Clone)]
pub struct InMemoryBroker {
    state: Arc<Mutex<State>>,
}

impl InMemoryBroker {
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                queue: VecDeque::new(),
                in_flight: HashMap::new(),
                next_tag: 0,
                visibility_timeout,
            })),
        }
    }

    pub fn enqueue(&self, job: RunStartJob) {
        self.state.lock().queue.push_back(job);
    }

    fn reclaim_expired(state: &mut State) {
        let now = Instant::now();
        let expired: Vec<String> = state
            .in_flight
            .iter()
            .filter(|(_, p)| p.visible_at <= now)
            .map(|(tag, _)| tag.clone())
            .collect();
        for tag in expired {
            if let Some(pending) = state.in_flight.remove(&tag) {
                state.queue.push_back(pending.job);
            }
        }
    }
}

#[async_trait]
impl TaskBroker for InMemoryBroker {
    async fn next_job(&self, wait: Duration) -> Result<Option<Delivery>, BrokerError> {
        let deadline = Instant::now() + wait;
        loop {
            let popped = {
                let mut state = self.state.lock();
                Self::reclaim_expired(&mut state);
                state.queue.pop_front().map(|job| {
                    let tag = state.next_tag.to_string();
                    state.next_tag += 1;
                    state.in_flight.insert(
                        tag.clone(),
                        Pending {
                            job: job.clone(),
                            visible_at: Instant::now() + state.visibility_timeout,
                        },
                    );
                    Delivery { job, tag }
                })
            };
            if let Some(delivery) = popped {
                return Ok(Some(delivery));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        self.state.lock().in_flight.remove(&delivery.tag);
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        let mut state = self.state.lock();
        if state.in_flight.remove(&delivery.tag).is_some() {
            state.queue.push_front(delivery.job.clone());
        }
        Ok(())
    }
}

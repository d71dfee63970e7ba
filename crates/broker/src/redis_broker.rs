//! Redis Streams-backed `TaskBroker`, using a consumer group for
//! at-least-once delivery: an unacked entry stays in the group's
//! pending-entries list and is reclaimed by whichever consumer next
//! runs `XAUTOCLAIM` past its idle threshold.

use crate::error::BrokerError;
use crate::wire::{decode, encode};
use crate::{Delivery, TaskBroker};
use async_trait::async_trait;
use orc_core::RunStartJob;
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, Client};
use std::time::Duration;

const FIELD: &str = "job";

#[derive(Clone)]
pub struct RedisBroker {
    conn: ConnectionManager,
    stream_key: String,
    group: String,
    consumer: String,
}

impl RedisBroker {
    pub async fn connect(
        url: &str,
        stream_key: impl Into<String>,
        group: impl Into<String>,
        consumer: impl Into<String>,
    ) -> Result<Self, BrokerError> {
        let client = Client::open(url).map_err(BrokerError::from)?;
        let mut conn = client.get_connection_manager().await.map_err(BrokerError::from)?;
        let stream_key = stream_key.into();
        let group = group.into();

        let created: Result<(), redis::RedisError> = conn
            .xgroup_create_mkstream(&stream_key, &group, "0")
            .await;
        if let Err(err) = created {
            if !err.to_string().contains("BUSYGROUP") {
                return Err(BrokerError::from(err));
            }
        }

        Ok(Self {
            conn,
            stream_key,
            group,
            consumer: consumer.into(),
        })
    }

    /// Enqueue a job. Not part of `TaskBroker` — producers upstream of
    /// this worker pool publish jobs; this is here for tests and for a
    /// worker acting as its own enqueuer in a single-process deployment.
    pub async fn publish(&self, job: &RunStartJob) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        let payload = encode(job)?;
        let _: String = conn.xadd(&self.stream_key, "*", &[(FIELD, payload)]).await.map_err(BrokerError::from)?;
        Ok(())
    }
}

#[async_trait]
impl TaskBroker for RedisBroker {
    async fn next_job(&self, wait: Duration) -> Result<Option<Delivery>, BrokerError> {
        let mut conn = self.conn.clone();
        let opts = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(1)
            .block(wait.as_millis() as usize);
        let reply: StreamReadReply = conn
            .xread_options(&[self.stream_key.as_str()], &[">"], &opts)
            .await
            .map_err(BrokerError::from)?;

        for stream_key in reply.keys {
            for entry in stream_key.ids {
                if let Some(value) = entry.map.get(FIELD) {
                    let payload: String = redis::from_redis_value(value).map_err(BrokerError::from)?;
                    let job = decode(&payload)?;
                    return Ok(Some(Delivery { job, tag: entry.id }));
                }
            }
        }
        Ok(None)
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .xack(&self.stream_key, &self.group, &[delivery.tag.as_str()])
            .await
            .map_err(BrokerError::from)?;
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        self.publish(&delivery.job).await?;
        self.ack(delivery).await
    }
}

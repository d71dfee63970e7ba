//! Stop Watcher (SW): a cooperative sibling task that listens for a
//! `STOP` control signal and sets a shared cancellation flag the drive
//! loop checks between events. Also refreshes the heartbeat key on a
//! time floor, independent of event traffic, so a quiet run's lock
//! doesn't expire out from under it.

use crate::config::WorkerConfig;
use orc_bus::{BusSubscription, StreamingBus};
use orc_core::{ControlSignal, InstanceId, StreamNamespace};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Poll interval for the control-channel subscription. Bounds
/// stop-signal latency to roughly this long per iteration.
const POLL_TIMEOUT: Duration = Duration::from_millis(500);

pub async fn watch<B: StreamingBus>(
    bus: B,
    namespace: StreamNamespace,
    instance_id: InstanceId,
    config: WorkerConfig,
    cancel: CancellationToken,
) {
    let channels = vec![
        namespace.global_control_channel(),
        namespace.instance_control_channel(&instance_id),
    ];
    let mut subscription = match bus.subscribe(&channels).await {
        Ok(sub) => sub,
        Err(err) => {
            tracing::error!(run_id = namespace.as_str(), error = %err, "stop watcher failed to subscribe; failing the run closed");
            cancel.cancel();
            return;
        }
    };

    let heartbeat_key = namespace.heartbeat_key(&instance_id);
    let mut last_refresh = Instant::now();

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            result = subscription.next_message(POLL_TIMEOUT) => result,
        };

        match message {
            Ok(Some((_channel, payload))) => {
                if matches!(ControlSignal::parse(&payload), Some(ControlSignal::Stop)) {
                    tracing::info!(run_id = namespace.as_str(), instance_id = instance_id.as_str(), "received STOP signal");
                    cancel.cancel();
                    break;
                }
            }
            Ok(None) => {}
            Err(err) => {
                tracing::error!(run_id = namespace.as_str(), error = %err, "stop watcher subscription error; failing the run closed");
                cancel.cancel();
                break;
            }
        }

        if last_refresh.elapsed() >= config.t_hb / 2 {
            if let Err(err) = bus.expire(&heartbeat_key, config.t_hb).await {
                tracing::warn!(run_id = namespace.as_str(), error = %err, "failed to refresh heartbeat TTL");
            }
            last_refresh = Instant::now();
        }
    }

    let _ = subscription.unsubscribe().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use orc_bus::InMemoryBus;
    use orc_core::RunId;

    fn test_config() -> WorkerConfig {
        let mut config = WorkerConfig::defaults_with_instance_id("inst-1");
        config.t_hb = Duration::from_millis(20);
        config
    }

    #[tokio::test]
    async fn stop_signal_cancels_the_token() {
        let bus = InMemoryBus::new();
        let namespace = StreamNamespace::for_run(&RunId::from_string("run-1"));
        let instance_id = InstanceId::from_string("inst-1");
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(watch(bus.clone(), namespace.clone(), instance_id.clone(), test_config(), cancel.clone()));

        // Give the watcher a moment to subscribe before publishing.
        tokio::time::sleep(Duration::from_millis(20)).await;
        bus.publish(&namespace.global_control_channel(), ControlSignal::Stop.as_str())
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn external_cancellation_stops_the_watcher_without_a_signal() {
        let bus = InMemoryBus::new();
        let namespace = StreamNamespace::for_run(&RunId::from_string("run-2"));
        let instance_id = InstanceId::from_string("inst-1");
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(watch(bus, namespace, instance_id, test_config(), cancel.clone()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    }
}

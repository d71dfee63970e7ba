//! Run Coordinator error taxonomy. Per the propagation policy, only
//! errors from outside the drive loop ever reach a caller — drive-loop
//! failures are caught and mapped onto a `failed` run instead.

use orc_bus::BusError;
use orc_broker::BrokerError;
use orc_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("streaming bus error: {0}")]
    Bus(#[from] BusError),
    #[error("state store error: {0}")]
    Store(#[from] StoreError),
    #[error("task broker error: {0}")]
    Broker(#[from] BrokerError),
    #[error(transparent)]
    MissingNamespace(#[from] orc_core::MissingNamespace),
}

//! Delivery of built orders to the order-management service.
//!
//! [`DimseSender`] stores each message with one C-STORE on its own association. It never
//! retries: it cannot tell a lost request from a lost response, so retry policy is left to the
//! caller.

use crate::config::{CoreConfig, Endpoint};
use crate::dimse::Session;
use crate::error::{DimseError, DispatchError, DispatchResult};
use async_trait::async_trait;
use dicom_wire::{command, OutboundMessage, StatusClass};
use std::time::Duration;

/// Sink for built order messages.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Deliver exactly one message.
    async fn send(&self, message: &OutboundMessage) -> DispatchResult<()>;
}

/// Order delivery by C-STORE over a DICOM association.
#[derive(Clone, Debug)]
pub struct DimseSender {
    endpoint: Endpoint,
    timeout: Duration,
}

impl DimseSender {
    pub fn new(endpoint: Endpoint, timeout: Duration) -> Self {
        Self { endpoint, timeout }
    }

    pub fn from_config(cfg: &CoreConfig) -> Self {
        Self::new(cfg.destination().clone(), cfg.network_timeout())
    }
}

#[async_trait]
impl Dispatcher for DimseSender {
    async fn send(&self, message: &OutboundMessage) -> DispatchResult<()> {
        let endpoint = self.endpoint.clone();
        let message = message.clone();
        let timeout = self.timeout;

        tokio::task::spawn_blocking(move || store(&endpoint, &message, timeout))
            .await
            .map_err(|e| DispatchError::Dimse(DimseError::Task(e.to_string())))?
    }
}

fn store(endpoint: &Endpoint, message: &OutboundMessage, timeout: Duration) -> DispatchResult<()> {
    let sop_class = message.sop_class_uid.as_str();
    let mut session = Session::open(endpoint, sop_class, timeout)?;

    let request = command::store_request(
        sop_class,
        message.sop_instance_uid.as_str(),
        message.message_id,
    );
    let response = session
        .send(&request, Some(&message.to_dataset()))
        .and_then(|()| session.receive());
    session.release();

    let status = command::status(&response?.command).map_err(DimseError::from)?;
    match StatusClass::of(status) {
        StatusClass::Success => {}
        StatusClass::Warning => tracing::warn!(
            "order {} stored by {} with warning status {:#06X}",
            message.accession_number,
            endpoint,
            status
        ),
        _ => return Err(DispatchError::Rejected { status }),
    }

    tracing::info!(
        "sent order {} (instance {}) to {}",
        message.accession_number,
        message.sop_instance_uid,
        endpoint
    );
    Ok(())
}

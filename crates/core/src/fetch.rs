//! Candidate fetching from the scheduling service.
//!
//! [`DimseWorklist`] runs a Modality Worklist C-FIND and returns the matches as a buffered
//! batch. The batch is all-or-nothing at the exchange level: if the association cannot be
//! established, the connection fails mid-query, or the final status is not success, nothing is
//! handed to the pipeline. Individual matches are judged on their own: one whose identifier
//! cannot be decoded, or that carries no accession number, is dropped with a warning and the
//! rest of the batch is kept.

use crate::config::{CoreConfig, Endpoint, WorklistFilter};
use crate::constants::QUERY_MESSAGE_ID;
use crate::dimse::Session;
use crate::error::{DimseError, FetchError, FetchResult};
use async_trait::async_trait;
use dicom_object::InMemDicomObject;
use dicom_uid::MODALITY_WORKLIST_FIND_SOP_CLASS;
use dicom_wire::{command, worklist_query, StatusClass, WireResult, WorkItem};
use std::time::Duration;

/// Source of candidate work items for one run.
#[async_trait]
pub trait CandidateFetcher: Send + Sync {
    /// Fetch every work item matching `filter`, in the order the service returned them.
    async fn fetch(&self, filter: &WorklistFilter) -> FetchResult<Vec<WorkItem>>;
}

/// Modality Worklist C-FIND over a DICOM association.
#[derive(Clone, Debug)]
pub struct DimseWorklist {
    endpoint: Endpoint,
    timeout: Duration,
}

impl DimseWorklist {
    pub fn new(endpoint: Endpoint, timeout: Duration) -> Self {
        Self { endpoint, timeout }
    }

    pub fn from_config(cfg: &CoreConfig) -> Self {
        Self::new(cfg.worklist().clone(), cfg.network_timeout())
    }
}

#[async_trait]
impl CandidateFetcher for DimseWorklist {
    async fn fetch(&self, filter: &WorklistFilter) -> FetchResult<Vec<WorkItem>> {
        let endpoint = self.endpoint.clone();
        let filter = filter.clone();
        let timeout = self.timeout;

        tokio::task::spawn_blocking(move || query(&endpoint, &filter, timeout))
            .await
            .map_err(|e| FetchError::Dimse(DimseError::Task(e.to_string())))?
    }
}

fn query(endpoint: &Endpoint, filter: &WorklistFilter, timeout: Duration) -> FetchResult<Vec<WorkItem>> {
    tracing::info!(
        "querying worklist {} for {} {} on {}",
        endpoint,
        filter.modality,
        filter.station_name,
        filter.start_date
    );

    let mut session = Session::open(endpoint, MODALITY_WORKLIST_FIND_SOP_CLASS, timeout)?;
    let identifier = worklist_query(
        &filter.start_date,
        filter.modality.as_str(),
        filter.station_name.as_str(),
    );
    session.send(
        &command::find_request(MODALITY_WORKLIST_FIND_SOP_CLASS, QUERY_MESSAGE_ID),
        Some(&identifier),
    )?;

    let mut received = 0_usize;
    let mut items = Vec::new();
    loop {
        let message = session.receive()?;
        let status = command::status(&message.command).map_err(DimseError::from)?;

        match StatusClass::of(status) {
            StatusClass::Pending => {
                let index = received;
                received += 1;
                let Some(bytes) = message.data else {
                    tracing::warn!("skipping worklist match {} without an identifier", index);
                    continue;
                };
                if let Some(item) = accept_work_item(index, session.decode(&bytes)) {
                    items.push(item);
                }
            }
            StatusClass::Success => break,
            _ => {
                tracing::warn!(
                    "worklist {} ended the query with status {:#06X} after {} matches",
                    session.peer(),
                    status,
                    received
                );
                session.release();
                return Err(FetchError::Rejected { status });
            }
        }
    }
    session.release();

    tracing::info!(
        "worklist returned {} records, {} accepted",
        received,
        items.len()
    );
    Ok(items)
}

/// Turn one decoded match into a work item, or drop it with a warning.
///
/// A match is dropped when its identifier failed to decode or has no accession number.
pub fn accept_work_item(index: usize, identifier: WireResult<InMemDicomObject>) -> Option<WorkItem> {
    let identifier = match identifier {
        Ok(identifier) => identifier,
        Err(e) => {
            tracing::warn!("skipping malformed worklist record {}: {}", index, e);
            return None;
        }
    };

    let item = WorkItem::from_identifier(&identifier);
    if item.accession_number().is_none() {
        tracing::warn!(
            "skipping worklist record {} without accession number (patient id: {})",
            index,
            item.patient_id().unwrap_or("<none>")
        );
        return None;
    }
    Some(item)
}

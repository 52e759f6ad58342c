//! Mapping of accepted work items into outbound order messages.

use crate::constants::OUTBOUND_MESSAGE_ID;
use crate::error::{BuildError, BuildResult};
use dicom_uid::{DicomUid, GP_SCHEDULED_PROCEDURE_STEP_SOP_CLASS};
use dicom_wire::{OutboundMessage, WorkItem};

/// Builds outbound messages.
///
/// This is a zero-sized type used for namespacing; building is pure apart from drawing a fresh
/// SOP Instance UID.
pub struct MessageBuilder;

impl MessageBuilder {
    /// Build the order message for `item`.
    ///
    /// Accession number, patient ID and patient name are copied unchanged. Every call allocates
    /// a new SOP Instance UID, so building the same item twice never yields the same instance.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::MissingAccessionNumber`] if `item` has no accession number.
    pub fn build(item: &WorkItem) -> BuildResult<OutboundMessage> {
        let accession_number = item
            .accession_number()
            .cloned()
            .ok_or(BuildError::MissingAccessionNumber)?;

        Ok(OutboundMessage {
            sop_class_uid: gp_sps_sop_class(),
            sop_instance_uid: DicomUid::generate(),
            message_id: OUTBOUND_MESSAGE_ID,
            accession_number,
            patient_id: item.patient_id().map(str::to_owned),
            patient_name: item.patient_name().map(str::to_owned),
        })
    }
}

fn gp_sps_sop_class() -> DicomUid {
    // SAFETY: registered SOP Class UIDs are syntactically valid, so parse will succeed
    DicomUid::parse(GP_SCHEDULED_PROCEDURE_STEP_SOP_CLASS)
        .expect("registered SOP Class UID is valid")
}

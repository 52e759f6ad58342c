//! Outbound order message model and its data set.

use crate::command::uid_value;
use dicom_core::value::DataSetSequence;
use dicom_core::{DataElement, PrimitiveValue, VR};
use dicom_dictionary_std::tags;
use dicom_object::InMemDicomObject;
use dicom_uid::DicomUid;
use orm_types::AccessionNumber;

/// One order as sent to the order-management service.
///
/// Built from exactly one work item and consumed by exactly one send. `message_id` is the
/// DIMSE Message ID of the C-STORE request that carries it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundMessage {
    pub sop_class_uid: DicomUid,
    /// Freshly generated for every message, including resends of the same accession number.
    pub sop_instance_uid: DicomUid,
    pub message_id: u16,
    pub accession_number: AccessionNumber,
    pub patient_id: Option<String>,
    pub patient_name: Option<String>,
}

impl OutboundMessage {
    /// The data set stored on the order-management service.
    ///
    /// Patient attributes that were not reported by the source are present but empty, so the
    /// receiver always sees the full attribute set. Both order identifier sequences are sent
    /// empty.
    pub fn to_dataset(&self) -> InMemDicomObject {
        let patient_id = match &self.patient_id {
            Some(id) => PrimitiveValue::from(id.as_str()),
            None => PrimitiveValue::Empty,
        };
        let patient_name = match &self.patient_name {
            Some(name) => PrimitiveValue::from(name.as_str()),
            None => PrimitiveValue::Empty,
        };
        let no_items: Vec<InMemDicomObject> = Vec::new();

        InMemDicomObject::from_element_iter([
            DataElement::new(
                tags::SOP_CLASS_UID,
                VR::UI,
                uid_value(self.sop_class_uid.as_str()),
            ),
            DataElement::new(
                tags::SOP_INSTANCE_UID,
                VR::UI,
                uid_value(self.sop_instance_uid.as_str()),
            ),
            DataElement::new(
                tags::ACCESSION_NUMBER,
                VR::SH,
                PrimitiveValue::from(self.accession_number.as_str()),
            ),
            DataElement::new(tags::PATIENT_NAME, VR::PN, patient_name),
            DataElement::new(tags::PATIENT_ID, VR::LO, patient_id),
            DataElement::new(
                tags::ORDER_PLACER_IDENTIFIER_SEQUENCE,
                VR::SQ,
                DataSetSequence::from(no_items.clone()),
            ),
            DataElement::new(
                tags::ORDER_FILLER_IDENTIFIER_SEQUENCE,
                VR::SQ,
                DataSetSequence::from(no_items),
            ),
        ])
    }
}

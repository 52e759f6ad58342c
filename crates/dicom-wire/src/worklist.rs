//! Modality Worklist query identifiers and response records.

use dicom_core::value::DataSetSequence;
use dicom_core::{DataElement, PrimitiveValue, Tag, VR};
use dicom_dictionary_std::tags;
use dicom_object::InMemDicomObject;
use orm_types::{AccessionNumber, DicomDate};

/// Build the C-FIND identifier for one worklist query.
///
/// The matching keys sit inside the Scheduled Procedure Step Sequence. Accession number,
/// patient ID, patient name and the step ID are requested as empty return keys.
pub fn worklist_query(start_date: &DicomDate, modality: &str, station_ae: &str) -> InMemDicomObject {
    let step = InMemDicomObject::from_element_iter([
        DataElement::new(
            tags::SCHEDULED_STATION_AE_TITLE,
            VR::AE,
            PrimitiveValue::from(station_ae),
        ),
        DataElement::new(
            tags::SCHEDULED_PROCEDURE_STEP_START_DATE,
            VR::DA,
            PrimitiveValue::from(start_date.to_string()),
        ),
        DataElement::new(tags::MODALITY, VR::CS, PrimitiveValue::from(modality)),
        DataElement::new(tags::SCHEDULED_PROCEDURE_STEP_ID, VR::SH, PrimitiveValue::Empty),
    ]);

    InMemDicomObject::from_element_iter([
        DataElement::new(tags::ACCESSION_NUMBER, VR::SH, PrimitiveValue::Empty),
        DataElement::new(tags::PATIENT_NAME, VR::PN, PrimitiveValue::Empty),
        DataElement::new(tags::PATIENT_ID, VR::LO, PrimitiveValue::Empty),
        DataElement::new(
            tags::SCHEDULED_PROCEDURE_STEP_SEQUENCE,
            VR::SQ,
            DataSetSequence::from(vec![step]),
        ),
    ])
}

/// One candidate order returned by the scheduling service.
///
/// The accession number is optional here because malformed source records are common. Callers
/// decide what to do with an item that lacks one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkItem {
    accession_number: Option<AccessionNumber>,
    patient_id: Option<String>,
    patient_name: Option<String>,
    procedure_id: Option<String>,
}

impl WorkItem {
    /// Builds a work item from one C-FIND response identifier.
    ///
    /// The Scheduled Procedure Step ID is read from the top level first and then from the first
    /// item of the Scheduled Procedure Step Sequence, where worklist providers nest it.
    pub fn from_identifier(identifier: &InMemDicomObject) -> Self {
        let procedure_id = text(identifier, tags::SCHEDULED_PROCEDURE_STEP_ID).or_else(|| {
            identifier
                .get(tags::SCHEDULED_PROCEDURE_STEP_SEQUENCE)
                .and_then(|e| e.items())
                .and_then(|items| items.first())
                .and_then(|step| text(step, tags::SCHEDULED_PROCEDURE_STEP_ID))
        });

        Self {
            accession_number: text(identifier, tags::ACCESSION_NUMBER)
                .and_then(|value| AccessionNumber::new(value).ok()),
            patient_id: text(identifier, tags::PATIENT_ID),
            patient_name: text(identifier, tags::PATIENT_NAME),
            procedure_id,
        }
    }

    pub fn accession_number(&self) -> Option<&AccessionNumber> {
        self.accession_number.as_ref()
    }

    pub fn patient_id(&self) -> Option<&str> {
        self.patient_id.as_deref()
    }

    pub fn patient_name(&self) -> Option<&str> {
        self.patient_name.as_deref()
    }

    pub fn procedure_id(&self) -> Option<&str> {
        self.procedure_id.as_deref()
    }
}

/// A string attribute with its trailing pad removed. Leading characters are part of the value.
/// Absent, empty and all-blank values read as `None`.
fn text(dataset: &InMemDicomObject, tag: Tag) -> Option<String> {
    let value = dataset.get(tag)?.to_str().ok()?;
    let value = value.trim_end_matches(|c: char| c == ' ' || c == '\0');
    if value.trim_start().is_empty() {
        return None;
    }
    Some(value.to_owned())
}

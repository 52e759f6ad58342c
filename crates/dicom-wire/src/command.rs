//! DIMSE command sets (PS3.7 section 9).

use crate::{WireError, WireResult};
use dicom_core::{DataElement, PrimitiveValue, VR};
use dicom_dictionary_std::tags;
use dicom_object::InMemDicomObject;

pub const C_STORE_RQ: u16 = 0x0001;
pub const C_FIND_RQ: u16 = 0x0020;

/// Command Data Set Type value meaning no data set follows the command.
pub const NO_DATA_SET: u16 = 0x0101;

/// Command Data Set Type value used on requests that carry a data set.
pub const DATA_SET_PRESENT: u16 = 0x0000;

const PRIORITY_MEDIUM: u16 = 0x0000;

/// Coarse classification of a DIMSE response status (PS3.7 Annex C).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    Pending,
    Warning,
    Cancel,
    Failure,
}

impl StatusClass {
    pub fn of(status: u16) -> Self {
        match status {
            0x0000 => Self::Success,
            0xFF00 | 0xFF01 => Self::Pending,
            0xFE00 => Self::Cancel,
            0x0001 | 0x0107 | 0x0116 | 0xB000..=0xBFFF => Self::Warning,
            _ => Self::Failure,
        }
    }
}

/// C-FIND-RQ command set for a query in `sop_class_uid`'s information model.
pub fn find_request(sop_class_uid: &str, message_id: u16) -> InMemDicomObject {
    InMemDicomObject::command_from_element_iter([
        DataElement::new(tags::AFFECTED_SOP_CLASS_UID, VR::UI, uid_value(sop_class_uid)),
        DataElement::new(tags::COMMAND_FIELD, VR::US, PrimitiveValue::from(C_FIND_RQ)),
        DataElement::new(tags::MESSAGE_ID, VR::US, PrimitiveValue::from(message_id)),
        DataElement::new(tags::PRIORITY, VR::US, PrimitiveValue::from(PRIORITY_MEDIUM)),
        DataElement::new(
            tags::COMMAND_DATA_SET_TYPE,
            VR::US,
            PrimitiveValue::from(DATA_SET_PRESENT),
        ),
    ])
}

/// C-STORE-RQ command set for one composite instance.
pub fn store_request(
    sop_class_uid: &str,
    sop_instance_uid: &str,
    message_id: u16,
) -> InMemDicomObject {
    InMemDicomObject::command_from_element_iter([
        DataElement::new(tags::AFFECTED_SOP_CLASS_UID, VR::UI, uid_value(sop_class_uid)),
        DataElement::new(tags::COMMAND_FIELD, VR::US, PrimitiveValue::from(C_STORE_RQ)),
        DataElement::new(tags::MESSAGE_ID, VR::US, PrimitiveValue::from(message_id)),
        DataElement::new(tags::PRIORITY, VR::US, PrimitiveValue::from(PRIORITY_MEDIUM)),
        DataElement::new(
            tags::COMMAND_DATA_SET_TYPE,
            VR::US,
            PrimitiveValue::from(DATA_SET_PRESENT),
        ),
        DataElement::new(
            tags::AFFECTED_SOP_INSTANCE_UID,
            VR::UI,
            uid_value(sop_instance_uid),
        ),
    ])
}

/// The Command Field of a command set.
pub fn command_field(command: &InMemDicomObject) -> WireResult<u16> {
    unsigned(command, tags::COMMAND_FIELD, "Command Field")
}

/// The Status of a response command set.
pub fn status(command: &InMemDicomObject) -> WireResult<u16> {
    unsigned(command, tags::STATUS, "Status")
}

/// Whether a data set follows this command set.
pub fn has_data_set(command: &InMemDicomObject) -> bool {
    command
        .get(tags::COMMAND_DATA_SET_TYPE)
        .and_then(|e| e.to_int::<u16>().ok())
        .is_some_and(|kind| kind != NO_DATA_SET)
}

fn unsigned(
    command: &InMemDicomObject,
    tag: dicom_core::Tag,
    name: &'static str,
) -> WireResult<u16> {
    command
        .get(tag)
        .ok_or(WireError::MissingAttribute(name))?
        .to_int::<u16>()
        .map_err(|e| WireError::Decode(format!("{name}: {e}")))
}

// UI values are padded to even length with a single NUL.
pub(crate) fn uid_value(uid: &str) -> PrimitiveValue {
    if uid.len() % 2 == 1 {
        PrimitiveValue::from(format!("{uid}\0"))
    } else {
        PrimitiveValue::from(uid)
    }
}

//! In-process DICOM peers for exercising the network adapters.
//!
//! A peer accepts exactly one association on a loopback port, answers the first request with a
//! scripted list of responses and records what it was sent.

use crate::dimse::read_message;
use crate::error::{DimseError, DimseResult};
use dicom_core::{DataElement, PrimitiveValue, VR};
use dicom_dictionary_std::tags;
use dicom_object::InMemDicomObject;
use dicom_ul::association::server::ServerAssociationOptions;
use dicom_ul::pdu::{PDataValue, PDataValueType, Pdu};
use dicom_wire::{codec, command, describe_error};
use std::net::{SocketAddr, TcpListener};
use std::thread::{self, JoinHandle};

/// One scripted response to the first request of an association.
pub(crate) enum Reply {
    /// A pending C-FIND response carrying this identifier.
    Match(InMemDicomObject),
    /// A pending C-FIND response carrying these bytes verbatim as its data set.
    RawMatch(Vec<u8>),
    /// The final response with this status.
    Done(u16),
}

pub(crate) struct Request {
    pub command: InMemDicomObject,
    pub data: Option<InMemDicomObject>,
}

pub(crate) struct PeerLog {
    pub calling_ae: String,
    pub requests: Vec<Request>,
}

pub(crate) struct Peer {
    pub addr: SocketAddr,
    handle: JoinHandle<DimseResult<PeerLog>>,
}

impl Peer {
    /// Start a peer answering as `ae_title` for `abstract_syntax`.
    pub fn spawn(ae_title: &'static str, abstract_syntax: &'static str, replies: Vec<Reply>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
        let addr = listener.local_addr().expect("local address");
        let handle = thread::spawn(move || serve(listener, ae_title, abstract_syntax, replies));
        Self { addr, handle }
    }

    /// Wait for the association to end and return what the peer saw.
    pub fn finish(self) -> DimseResult<PeerLog> {
        self.handle
            .join()
            .map_err(|_| DimseError::Task("peer thread panicked".into()))?
    }
}

fn network<E: std::error::Error + 'static>(e: E) -> DimseError {
    DimseError::Network(describe_error(&e))
}

fn serve(
    listener: TcpListener,
    ae_title: &'static str,
    abstract_syntax: &'static str,
    replies: Vec<Reply>,
) -> DimseResult<PeerLog> {
    let (stream, _) = listener.accept().map_err(network)?;
    let mut association = ServerAssociationOptions::new()
        .accept_called_ae_title()
        .ae_title(ae_title)
        .with_abstract_syntax(abstract_syntax)
        .establish(stream)
        .map_err(|e| DimseError::Association {
            peer: "test client".into(),
            reason: describe_error(&e),
        })?;

    let (pc_id, transfer_syntax) = match association.presentation_contexts().first() {
        Some(pc) => (pc.id, pc.transfer_syntax.clone()),
        None => {
            return Err(DimseError::NoPresentationContext {
                peer: "test client".into(),
            })
        }
    };
    let mut log = PeerLog {
        calling_ae: association.client_ae_title().to_owned(),
        requests: Vec::new(),
    };
    let mut replies = Some(replies);

    loop {
        let message = read_message(|| association.receive().map_err(network))?;
        let Some(message) = message else {
            association.send(&Pdu::ReleaseRP).map_err(network)?;
            return Ok(log);
        };

        let data = match &message.data {
            Some(bytes) => Some(codec::decode_dataset(bytes, &transfer_syntax)?),
            None => None,
        };
        let request = Request {
            command: message.command,
            data,
        };

        for reply in replies.take().unwrap_or_default() {
            let (status, payload) = match reply {
                Reply::Match(identifier) => (
                    0xFF00,
                    Some(codec::encode_dataset(&identifier, &transfer_syntax)?),
                ),
                Reply::RawMatch(bytes) => (0xFF00, Some(bytes)),
                Reply::Done(status) => (status, None),
            };

            let mut values = vec![PDataValue {
                presentation_context_id: pc_id,
                value_type: PDataValueType::Command,
                is_last: true,
                data: codec::encode_command(&response_to(
                    &request.command,
                    status,
                    payload.is_some(),
                ))?,
            }];
            if let Some(bytes) = payload {
                values.push(PDataValue {
                    presentation_context_id: pc_id,
                    value_type: PDataValueType::Data,
                    is_last: true,
                    data: bytes,
                });
            }
            association
                .send(&Pdu::PData { data: values })
                .map_err(network)?;
        }

        log.requests.push(request);
    }
}

fn response_to(request: &InMemDicomObject, status: u16, with_data: bool) -> InMemDicomObject {
    let field = command::command_field(request).unwrap_or_default() | 0x8000;
    let message_id = request
        .get(tags::MESSAGE_ID)
        .and_then(|e| e.to_int::<u16>().ok())
        .unwrap_or_default();
    let sop_class = request
        .get(tags::AFFECTED_SOP_CLASS_UID)
        .and_then(|e| e.to_str().ok())
        .map(|uid| uid.into_owned())
        .unwrap_or_default();
    let data_set_type = if with_data {
        command::DATA_SET_PRESENT
    } else {
        command::NO_DATA_SET
    };

    InMemDicomObject::command_from_element_iter([
        DataElement::new(tags::AFFECTED_SOP_CLASS_UID, VR::UI, PrimitiveValue::from(sop_class)),
        DataElement::new(tags::COMMAND_FIELD, VR::US, PrimitiveValue::from(field)),
        DataElement::new(
            tags::MESSAGE_ID_BEING_RESPONDED_TO,
            VR::US,
            PrimitiveValue::from(message_id),
        ),
        DataElement::new(
            tags::COMMAND_DATA_SET_TYPE,
            VR::US,
            PrimitiveValue::from(data_set_type),
        ),
        DataElement::new(tags::STATUS, VR::US, PrimitiveValue::from(status)),
    ])
}

/// A string attribute with trailing padding removed.
pub(crate) fn text(dataset: &InMemDicomObject, tag: dicom_core::Tag) -> Option<String> {
    dataset
        .get(tag)
        .and_then(|e| e.to_str().ok())
        .map(|s| s.trim_end_matches(|c: char| c == ' ' || c == '\0').to_owned())
}

/// A worklist response identifier with the given attributes.
pub(crate) fn identifier(
    accession: Option<&str>,
    patient_id: Option<&str>,
    patient_name: Option<&str>,
) -> InMemDicomObject {
    let mut dataset = InMemDicomObject::new_empty();
    if let Some(accession) = accession {
        dataset.put(DataElement::new(
            tags::ACCESSION_NUMBER,
            VR::SH,
            PrimitiveValue::from(accession),
        ));
    }
    if let Some(id) = patient_id {
        dataset.put(DataElement::new(tags::PATIENT_ID, VR::LO, PrimitiveValue::from(id)));
    }
    if let Some(name) = patient_name {
        dataset.put(DataElement::new(tags::PATIENT_NAME, VR::PN, PrimitiveValue::from(name)));
    }
    dataset
}

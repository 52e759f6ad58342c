//! One-shot DIMSE sessions over a DICOM upper layer association.
//!
//! A [`Session`] proposes a single abstract syntax, negotiates the calling and called AE titles
//! of its [`Endpoint`], exchanges messages on the first accepted presentation context and is
//! released when the exchange is done. Sessions are blocking; the async adapters run them on
//! the blocking thread pool.

use crate::config::Endpoint;
use crate::error::{DimseError, DimseResult};
use dicom_object::InMemDicomObject;
use dicom_ul::association::client::{ClientAssociation, ClientAssociationOptions};
use dicom_ul::pdu::{PDataValue, PDataValueType, Pdu};
use dicom_wire::{codec, command, describe_error, WireResult};
use std::net::TcpStream;
use std::time::Duration;

/// One DIMSE message: a decoded command set and, when the command announces one, the raw
/// bytes of the data set that followed it.
///
/// The data set is left encoded so that a record which fails to decode can be dropped on its
/// own.
#[derive(Debug)]
pub(crate) struct Message {
    pub command: InMemDicomObject,
    pub data: Option<Vec<u8>>,
}

pub(crate) struct Session {
    association: ClientAssociation<TcpStream>,
    presentation_context_id: u8,
    transfer_syntax: String,
    peer: String,
}

impl Session {
    /// Open an association to `endpoint` proposing `abstract_syntax`.
    pub fn open(endpoint: &Endpoint, abstract_syntax: &str, timeout: Duration) -> DimseResult<Self> {
        let peer = endpoint.to_string();
        tracing::debug!(
            "opening association {} -> {} for {}",
            endpoint.calling_ae(),
            peer,
            abstract_syntax
        );

        let association = ClientAssociationOptions::new()
            .with_abstract_syntax(abstract_syntax)
            .calling_ae_title(endpoint.calling_ae())
            .called_ae_title(endpoint.called_ae())
            .read_timeout(timeout)
            .write_timeout(timeout)
            .establish((endpoint.host(), endpoint.port()))
            .map_err(|e| DimseError::Association {
                peer: peer.clone(),
                reason: describe_error(&e),
            })?;

        let (presentation_context_id, transfer_syntax) =
            match association.presentation_contexts().first() {
                Some(pc) => (pc.id, pc.transfer_syntax.clone()),
                None => return Err(DimseError::NoPresentationContext { peer }),
            };

        Ok(Self {
            association,
            presentation_context_id,
            transfer_syntax,
            peer,
        })
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Send a command set, followed by `data` when given, in a single P-DATA-TF.
    pub fn send(
        &mut self,
        command: &InMemDicomObject,
        data: Option<&InMemDicomObject>,
    ) -> DimseResult<()> {
        let mut values = vec![PDataValue {
            presentation_context_id: self.presentation_context_id,
            value_type: PDataValueType::Command,
            is_last: true,
            data: codec::encode_command(command)?,
        }];
        if let Some(data) = data {
            values.push(PDataValue {
                presentation_context_id: self.presentation_context_id,
                value_type: PDataValueType::Data,
                is_last: true,
                data: codec::encode_dataset(data, &self.transfer_syntax)?,
            });
        }

        self.association
            .send(&Pdu::PData { data: values })
            .map_err(|e| DimseError::Network(describe_error(&e)))
    }

    /// Receive the next complete message from the peer.
    pub fn receive(&mut self) -> DimseResult<Message> {
        let association = &mut self.association;
        read_message(|| {
            association
                .receive()
                .map_err(|e| DimseError::Network(describe_error(&e)))
        })?
        .ok_or_else(|| DimseError::UnexpectedPdu("A-RELEASE-RQ".into()))
    }

    /// Decode a data set received on this session.
    pub fn decode(&self, bytes: &[u8]) -> WireResult<InMemDicomObject> {
        codec::decode_dataset(bytes, &self.transfer_syntax)
    }

    /// Release the association. A failed release is logged; the exchange itself already
    /// completed.
    pub fn release(self) {
        let peer = self.peer;
        if let Err(e) = self.association.release() {
            tracing::warn!("association release with {} failed: {}", peer, describe_error(&e));
        }
    }
}

/// Reassemble one message from P-DATA-TF PDUs pulled through `next_pdu`.
///
/// Command and data set fragments are concatenated until their last fragment arrives.
/// Returns `None` when the peer asks to release the association instead.
pub(crate) fn read_message<F>(mut next_pdu: F) -> DimseResult<Option<Message>>
where
    F: FnMut() -> DimseResult<Pdu>,
{
    let mut command_bytes = Vec::new();
    let mut data_bytes = Vec::new();
    let mut command: Option<InMemDicomObject> = None;

    loop {
        match next_pdu()? {
            Pdu::PData { data } => {
                for value in data {
                    match value.value_type {
                        PDataValueType::Command => {
                            command_bytes.extend_from_slice(&value.data);
                            if value.is_last {
                                command = Some(codec::decode_command(&command_bytes)?);
                            }
                        }
                        PDataValueType::Data => {
                            data_bytes.extend_from_slice(&value.data);
                            if value.is_last {
                                let command = command.take().ok_or_else(|| {
                                    DimseError::UnexpectedPdu(
                                        "data set before its command set".into(),
                                    )
                                })?;
                                return Ok(Some(Message {
                                    command,
                                    data: Some(data_bytes),
                                }));
                            }
                        }
                    }
                }

                if let Some(complete) = command.take() {
                    if !command::has_data_set(&complete) {
                        return Ok(Some(Message {
                            command: complete,
                            data: None,
                        }));
                    }
                    command = Some(complete);
                }
            }
            Pdu::ReleaseRQ => return Ok(None),
            other => return Err(DimseError::UnexpectedPdu(format!("{other:?}"))),
        }
    }
}

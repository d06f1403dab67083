//! Wire messages exchanged over the broker.
//!
//! Three commands make up the protocol, fields joined by `::`:
//!
//! ```text
//! share_tensor::{name}::{manager_ref}::{segment_ref}::{dtype}::{dims}
//! const::{name}::{int|float|str}::{value}::{receiver_id}
//! stop::
//! ```
//!
//! Field values are not escaped; a name or value containing `::` cannot
//! be decoded.

use crate::error::{BusError, BusResult};
use crate::handle::TensorHandle;
use crate::variable::Variable;
use tensorbus_common::consts::{FIELD_DELIMITER, STOP_MESSAGE};

/// `share_tensor` command
pub const SHARE_TENSOR: &str = "share_tensor";
/// `const` command
pub const CONST: &str = "const";
/// `stop` command
pub const STOP: &str = "stop";

const SHARE_TENSOR_FIELDS: usize = 6;
const CONST_FIELDS: usize = 5;

/// A named tensor made available through a handle
#[derive(Debug, Clone, PartialEq)]
pub struct TensorAnnouncement {
    /// Tensor name
    pub name: String,
    /// Handle of its segment
    pub handle: TensorHandle,
}

impl TensorAnnouncement {
    /// Decode the payload following `share_tensor::`
    pub fn from_payload(payload: &str) -> BusResult<Self> {
        let (name, handle) = payload.split_once(FIELD_DELIMITER).ok_or_else(|| {
            BusError::Protocol {
                message: payload.to_string(),
                reason: "share_tensor payload without handle".to_string(),
            }
        })?;
        Ok(Self {
            name: name.to_string(),
            handle: TensorHandle::decode(handle)?,
        })
    }
}

/// Decoded wire message
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// New or refreshed tensor segment
    ShareTensor(TensorAnnouncement),
    /// Variable announcement or update
    Const {
        /// Variable name
        name: String,
        /// Coerced value
        value: Variable,
        /// Addressed receiver
        receiver_id: i32,
    },
    /// Sentinel ending a receive loop
    Stop,
    /// Command outside the protocol vocabulary, left to callbacks
    Other {
        /// Command prefix
        command: String,
        /// Everything after the first delimiter
        payload: String,
    },
}

impl Message {
    /// `share_tensor` message
    pub fn share_tensor(name: impl Into<String>, handle: TensorHandle) -> Self {
        Self::ShareTensor(TensorAnnouncement {
            name: name.into(),
            handle,
        })
    }

    /// `const` message
    pub fn constant(name: impl Into<String>, value: Variable, receiver_id: i32) -> Self {
        Self::Const {
            name: name.into(),
            value,
            receiver_id,
        }
    }

    /// Command prefix
    pub fn command(&self) -> &str {
        match self {
            Self::ShareTensor(_) => SHARE_TENSOR,
            Self::Const { .. } => CONST,
            Self::Stop => STOP,
            Self::Other { command, .. } => command,
        }
    }

    /// Encode to the wire form
    pub fn encode(&self) -> String {
        match self {
            Self::ShareTensor(TensorAnnouncement { name, handle }) => {
                [SHARE_TENSOR, name.as_str(), handle.encode().as_str()].join(FIELD_DELIMITER)
            }
            Self::Const {
                name,
                value,
                receiver_id,
            } => [
                CONST,
                name.as_str(),
                value.type_tag(),
                value.to_string().as_str(),
                receiver_id.to_string().as_str(),
            ]
            .join(FIELD_DELIMITER),
            Self::Stop => STOP_MESSAGE.to_string(),
            Self::Other { command, payload } => [command.as_str(), payload.as_str()].join(FIELD_DELIMITER),
        }
    }

    /// Decode the wire form.
    ///
    /// Only the exact sentinel `stop::` decodes to [`Message::Stop`].
    pub fn decode(raw: &str) -> BusResult<Self> {
        if raw == STOP_MESSAGE {
            return Ok(Self::Stop);
        }

        let protocol = |reason: String| BusError::Protocol {
            message: raw.to_string(),
            reason,
        };

        let (command, payload) = raw
            .split_once(FIELD_DELIMITER)
            .ok_or_else(|| protocol("missing field delimiter".to_string()))?;
        let field_count = raw.split(FIELD_DELIMITER).count();

        match command {
            SHARE_TENSOR => {
                if field_count != SHARE_TENSOR_FIELDS {
                    return Err(protocol(format!(
                        "share_tensor expects {SHARE_TENSOR_FIELDS} fields, found {field_count}"
                    )));
                }
                Ok(Self::ShareTensor(TensorAnnouncement::from_payload(payload)?))
            }
            CONST => {
                let fields: Vec<&str> = payload.split(FIELD_DELIMITER).collect();
                let [name, type_tag, value, receiver_id] = fields[..] else {
                    return Err(protocol(format!(
                        "const expects {CONST_FIELDS} fields, found {field_count}"
                    )));
                };
                let value = Variable::from_wire(type_tag, value).map_err(&protocol)?;
                let receiver_id = receiver_id
                    .parse()
                    .map_err(|_| protocol(format!("invalid receiver id `{receiver_id}`")))?;
                Ok(Self::constant(name, value, receiver_id))
            }
            STOP => Err(protocol("sentinel must be exactly `stop::`".to_string())),
            _ => Ok(Self::Other {
                command: command.to_string(),
                payload: payload.to_string(),
            }),
        }
    }
}

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{CommandError, CommandName};

/// A control message as it travels on the wire.
///
/// ```
/// use wsvpn::command::{Command, CommandName};
/// let cmd = Command::parse(br#"{"command":"ping","id":3}"#).unwrap();
/// assert_eq!(cmd.command, CommandName::PING);
/// assert_eq!(cmd.id, Some(3));
/// assert!(cmd.parameters.is_null());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub command: CommandName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default)]
    pub parameters: Value,
}

impl Command {
    /// Build a command from serialisable parameters.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Encode`] if `parameters` cannot be converted
    /// to JSON.
    pub fn new<P: Serialize>(
        command: CommandName,
        id: Option<u64>,
        parameters: &P,
    ) -> Result<Self, CommandError> {
        let parameters = serde_json::to_value(parameters).map_err(|source| {
            CommandError::Encode {
                command: command.clone(),
                source,
            }
        })?;
        Ok(Self {
            command,
            id,
            parameters,
        })
    }

    /// Decode a control message.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Malformed`] for anything that is not a
    /// command object.
    pub fn parse(payload: &[u8]) -> Result<Self, CommandError> {
        serde_json::from_slice(payload).map_err(CommandError::Malformed)
    }

    /// Decode the parameters into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::InvalidParameters`] on a shape mismatch.
    pub fn parameters<'a, T: Deserialize<'a>>(&'a self) -> Result<T, CommandError> {
        T::deserialize(&self.parameters).map_err(|source| CommandError::InvalidParameters {
            command: self.command.clone(),
            source,
        })
    }

    /// Encode the command for the transport.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Encode`] if serialisation fails.
    pub fn to_bytes(&self) -> Result<Bytes, CommandError> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|source| CommandError::Encode {
                command: self.command.clone(),
                source,
            })
    }
}

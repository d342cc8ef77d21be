//! Wire envelopes
//!
//! Field names follow the toolchain's JSON exactly. Byte fields travel as
//! standard base64 and are left out when empty, like every other zero value
//! except `ID`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Commands this server understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Put,
    Get,
    Close,
}

impl Command {
    /// Every supported command, in the order advertised at startup
    pub const ALL: [Command; 3] = [Command::Put, Command::Get, Command::Close];
}

/// One inbound request line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    #[serde(rename = "ID")]
    pub id: i64,

    #[serde(rename = "Command")]
    pub command: Command,

    #[serde(
        rename = "ActionID",
        default,
        with = "base64_bytes",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub action_id: Vec<u8>,

    #[serde(
        rename = "OutputID",
        default,
        with = "base64_bytes",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub output_id: Vec<u8>,

    /// Length of the body carried on the following line
    ///
    /// Signed on the wire; a negative value is rejected per request.
    #[serde(rename = "BodySize", default, skip_serializing_if = "is_zero")]
    pub body_size: i64,
}

/// One outbound response line
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "ID")]
    pub id: i64,

    #[serde(rename = "Err", default, skip_serializing_if = "String::is_empty")]
    pub err: String,

    #[serde(
        rename = "KnownCommands",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub known_commands: Vec<Command>,

    #[serde(rename = "Miss", default, skip_serializing_if = "is_false")]
    pub miss: bool,

    #[serde(
        rename = "OutputID",
        default,
        with = "base64_bytes",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub output_id: Vec<u8>,

    #[serde(rename = "Size", default, skip_serializing_if = "is_zero")]
    pub size: u64,

    #[serde(rename = "Time", default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,

    #[serde(rename = "DiskPath", default, skip_serializing_if = "Option::is_none")]
    pub disk_path: Option<PathBuf>,
}

impl Response {
    /// The unsolicited first line of every session
    pub fn capabilities() -> Self {
        Self {
            id: 0,
            known_commands: Command::ALL.to_vec(),
            ..Self::default()
        }
    }

    /// Empty response answering request `id`
    pub fn reply(id: i64) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }
}

fn is_zero<T: Default + PartialEq>(n: &T) -> bool {
    *n == T::default()
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Base64 (standard alphabet) for byte fields; `null` reads as empty
pub(crate) mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(encoded) => STANDARD.decode(encoded).map_err(D::Error::custom),
            None => Ok(Vec::new()),
        }
    }
}

//! Job owner
//!
//! The owner is whoever submitted a score and gets told where the recording
//! ended up. It is persisted as a small JSON blob keyed by a `type`
//! discriminator; new kinds of owner get a new tag.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

const TAG_EMAIL: &str = "email";
const TAG_CHAT: &str = "chat";

/// Notification target of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum Owner {
    /// Submitted by mail; replies go to `address`
    Email { address: String },
    /// Submitted from a chat integration
    Chat { user_id: u64, channel_id: u64 },
}

/// Errors decoding a persisted owner blob
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OwnerError {
    #[error("owner blob has no 'type' discriminator")]
    MissingTag,

    #[error("unsupported owner type '{0}'")]
    UnknownTag(String),

    #[error("owner blob of type '{tag}' is missing field '{field}'")]
    MissingField { tag: &'static str, field: &'static str },
}

impl Owner {
    /// Discriminator stored alongside the owner's fields
    pub fn tag(&self) -> &'static str {
        match self {
            Owner::Email { .. } => TAG_EMAIL,
            Owner::Chat { .. } => TAG_CHAT,
        }
    }

    /// Encodes the owner for storage
    pub fn to_blob(&self) -> Value {
        match self {
            Owner::Email { address } => json!({
                "type": TAG_EMAIL,
                "email": address,
            }),
            Owner::Chat {
                user_id,
                channel_id,
            } => json!({
                "type": TAG_CHAT,
                "user_id": user_id,
                "channel_id": channel_id,
            }),
        }
    }

    /// Decodes an owner previously produced by [`Owner::to_blob`]
    pub fn from_blob(blob: &Value) -> Result<Self, OwnerError> {
        let tag = blob
            .get("type")
            .and_then(Value::as_str)
            .ok_or(OwnerError::MissingTag)?;

        match tag {
            TAG_EMAIL => {
                let address = blob
                    .get("email")
                    .and_then(Value::as_str)
                    .ok_or(OwnerError::MissingField {
                        tag: TAG_EMAIL,
                        field: "email",
                    })?;
                Ok(Owner::Email {
                    address: address.to_string(),
                })
            }
            TAG_CHAT => {
                let field = |name: &'static str| {
                    blob.get(name)
                        .and_then(Value::as_u64)
                        .ok_or(OwnerError::MissingField {
                            tag: TAG_CHAT,
                            field: name,
                        })
                };
                Ok(Owner::Chat {
                    user_id: field("user_id")?,
                    channel_id: field("channel_id")?,
                })
            }
            other => Err(OwnerError::UnknownTag(other.to_string())),
        }
    }
}

impl From<Owner> for Value {
    fn from(owner: Owner) -> Self {
        owner.to_blob()
    }
}

impl TryFrom<Value> for Owner {
    type Error = OwnerError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Owner::from_blob(&value)
    }
}

impl std::fmt::Display for Owner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Owner::Email { address } => write!(f, "{}", address),
            Owner::Chat {
                user_id,
                channel_id,
            } => write!(f, "chat user {} in channel {}", user_id, channel_id),
        }
    }
}

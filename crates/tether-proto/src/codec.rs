use serde_json::{Map, Value};
use thiserror::Error;

/// Names of the three envelope fields on the wire.
///
/// The control plane owns these names, so they are configuration rather than
/// serde attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireFields {
    pub kind: String,
    pub target: String,
    pub payload: String,
}

impl Default for WireFields {
    fn default() -> Self {
        Self {
            kind: "type".to_string(),
            target: "agentId".to_string(),
            payload: "content".to_string(),
        }
    }
}

impl WireFields {
    pub fn new(
        kind: impl Into<String>,
        target: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            target: target.into(),
            payload: payload.into(),
        }
    }
}

/// One message unit exchanged over the persistent connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub kind: String,
    /// `None` or empty means broadcast.
    pub target: Option<String>,
    pub payload: Value,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, payload: impl Into<Value>) -> Self {
        Self {
            kind: kind.into(),
            target: None,
            payload: payload.into(),
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn is_broadcast(&self) -> bool {
        self.target.as_deref().map_or(true, str::is_empty)
    }

    /// Broadcasts are accepted unconditionally; anything else must match exactly.
    pub fn is_addressed_to(&self, identity: &str) -> bool {
        self.is_broadcast() || self.target.as_deref() == Some(identity)
    }

    pub fn payload_str(&self) -> Option<&str> {
        self.payload.as_str()
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    #[error("frame is not a JSON object")]
    NotAnObject,
    #[error("missing or empty `{0}` field")]
    MissingKind(String),
    #[error("`{0}` field must be a string")]
    NotAString(String),
}

/// Translates between raw frames and [`Envelope`]s using a fixed [`WireFields`] mapping.
#[derive(Debug, Clone, Default)]
pub struct Codec {
    fields: WireFields,
}

impl Codec {
    pub fn new(fields: WireFields) -> Self {
        Self { fields }
    }

    pub fn decode(&self, raw: &[u8]) -> Result<Envelope, DecodeError> {
        let value: Value = serde_json::from_slice(raw)?;
        let Value::Object(mut object) = value else {
            return Err(DecodeError::NotAnObject);
        };

        let kind = match object.remove(&self.fields.kind) {
            Some(Value::String(kind)) if !kind.is_empty() => kind,
            Some(Value::String(_)) | None | Some(Value::Null) => {
                return Err(DecodeError::MissingKind(self.fields.kind.clone()));
            }
            Some(_) => return Err(DecodeError::NotAString(self.fields.kind.clone())),
        };

        let target = match object.remove(&self.fields.target) {
            None | Some(Value::Null) => None,
            Some(Value::String(target)) => Some(target),
            Some(_) => return Err(DecodeError::NotAString(self.fields.target.clone())),
        };

        let payload = object.remove(&self.fields.payload).unwrap_or(Value::Null);

        Ok(Envelope {
            kind,
            target,
            payload,
        })
    }

    pub fn encode(&self, envelope: &Envelope) -> String {
        let mut object = Map::with_capacity(3);
        object.insert(
            self.fields.kind.clone(),
            Value::String(envelope.kind.clone()),
        );
        if let Some(target) = &envelope.target {
            object.insert(self.fields.target.clone(), Value::String(target.clone()));
        }
        object.insert(self.fields.payload.clone(), envelope.payload.clone());
        Value::Object(object).to_string()
    }
}

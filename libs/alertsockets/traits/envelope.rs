use crate::error::Result;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Decoded shape of every inbound frame
///
/// `status` mirrors HTTP status semantics even though the transport
/// is a WebSocket. Fields outside the common four are kept in `fields`.
/// Null or malformed common fields fall back to their defaults so the
/// frame still routes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, deserialize_with = "null_as_default")]
    pub error: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(default, rename = "type", deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(default, deserialize_with = "lenient_status")]
    pub status: u16,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Anything that is not a whole number in `0..=65535` reads as 0
fn lenient_status<'de, D>(deserializer: D) -> std::result::Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    let status = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(number)) => number
            .as_u64()
            .and_then(|n| u16::try_from(n).ok())
            .or_else(|| {
                number
                    .as_f64()
                    .filter(|f| f.fract() == 0.0 && (0.0..=f64::from(u16::MAX)).contains(f))
                    .map(|f| f as u16)
            }),
        Some(Value::String(text)) => text.trim().parse().ok(),
        _ => None,
    };
    Ok(status.unwrap_or_default())
}

impl Envelope {
    /// Decode a raw text frame
    pub fn decode(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Error flag set or an HTTP-style failure status
    pub fn is_failure(&self) -> bool {
        self.error || self.status >= 400
    }

    /// 2xx status
    pub fn is_success_status(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 401 status, the only rejection that is retried with a fresh credential
    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Get a domain field by name
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Extract the entity-update view if this envelope belongs to the
    /// reserved category `update_type` and carries a success status.
    pub fn entity_update(&self, update_type: &str) -> Option<EntityUpdate> {
        if self.kind != update_type || !self.is_success_status() {
            return None;
        }

        let entity = self.field("entity")?;
        let entity_id = scalar_to_string(entity.get("id")?)?;
        let version = scalar_to_string(self.field("version")?)?;
        let payload = serde_json::to_value(self).ok()?;

        Some(EntityUpdate {
            entity_id,
            version,
            entity: entity.clone(),
            payload,
        })
    }
}

/// A successful entity-update notification
#[derive(Debug, Clone, PartialEq)]
pub struct EntityUpdate {
    pub entity_id: String,
    pub version: String,
    pub entity: Value,
    /// The whole envelope, common fields included
    pub payload: Value,
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Encode an outbound payload
///
/// Strings go out raw; everything else is JSON-encoded.
pub fn encode_outbound<T>(data: &T) -> Result<String>
where
    T: Serialize + ?Sized,
{
    match serde_json::to_value(data)? {
        Value::String(text) => Ok(text),
        other => Ok(serde_json::to_string(&other)?),
    }
}

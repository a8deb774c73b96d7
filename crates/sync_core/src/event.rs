use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;

/// Result of looking for a message body on the trigger event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerMessage {
    /// The event carries no `data` field.
    Absent,
    Decoded(String),
    /// A `data` field was present but was not base64-encoded UTF-8 text.
    Undecodable(String),
}

/// Extracts the optional base64 `data` payload of a queue trigger event.
///
/// Accepts the background-function shape (`{"data": ...}`) and the push
/// envelope (`{"message": {"data": ...}}`).
pub fn decode_trigger_message(event: &Value) -> TriggerMessage {
    let data = event.get("data").or_else(|| {
        event
            .get("message")
            .and_then(|message| message.get("data"))
    });

    let Some(data) = data else {
        return TriggerMessage::Absent;
    };

    let Some(encoded) = data.as_str() else {
        return TriggerMessage::Undecodable("data field must be a string".to_string());
    };

    let bytes = match STANDARD.decode(encoded.trim()) {
        Ok(value) => value,
        Err(error) => return TriggerMessage::Undecodable(format!("invalid base64: {error}")),
    };

    match String::from_utf8(bytes) {
        Ok(text) => TriggerMessage::Decoded(text),
        Err(error) => TriggerMessage::Undecodable(format!("invalid UTF-8: {error}")),
    }
}

//! JSON wire format of the chat service
//!
//! The service stores messages in a document database and serializes them
//! with extended-JSON conventions, so ids arrive as `{"$oid": ".."}` and
//! dates may arrive as `{"$date": ..}`. Plain strings are accepted too.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::error::TransportError;
use crate::models::Message;

/// Message as serialized by the chat service
#[derive(Debug, Clone, Deserialize)]
pub struct WireMessage {
    #[serde(rename = "_id", alias = "id")]
    pub id: WireId,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, alias = "text")]
    pub message: Option<String>,
    pub timestamp: WireTimestamp,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireId {
    Object {
        #[serde(rename = "$oid")]
        oid: String,
    },
    Plain(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireTimestamp {
    Date {
        #[serde(rename = "$date")]
        date: WireDate,
    },
    Text(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireDate {
    Millis(i64),
    NumberLong {
        #[serde(rename = "$numberLong")]
        millis: String,
    },
    Text(String),
}

impl WireMessage {
    /// Convert into the domain model
    pub fn into_message(self) -> Result<Message, TransportError> {
        let id = match self.id {
            WireId::Object { oid } => oid,
            WireId::Plain(id) => id,
        };
        if id.is_empty() {
            return Err(TransportError::malformed("message with empty id"));
        }

        let timestamp = match self.timestamp {
            WireTimestamp::Text(text) | WireTimestamp::Date { date: WireDate::Text(text) } => {
                parse_timestamp(&text)?
            }
            WireTimestamp::Date {
                date: WireDate::Millis(millis),
            } => from_millis(millis)?,
            WireTimestamp::Date {
                date: WireDate::NumberLong { millis },
            } => {
                let millis = millis.parse::<i64>().map_err(|_| {
                    TransportError::malformed(format!("invalid $numberLong date '{}'", millis))
                })?;
                from_millis(millis)?
            }
        };

        Ok(Message {
            id,
            username: self.username.unwrap_or_default(),
            text: self.message.unwrap_or_default(),
            timestamp,
        })
    }
}

/// Decode a fetch-messages response body
///
/// Anything other than a JSON array of well-formed messages is rejected as a
/// whole; a snapshot is never partially applied.
pub fn decode_messages(body: &str) -> Result<Vec<Message>, TransportError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| TransportError::malformed(format!("invalid JSON: {}", e)))?;

    let Value::Array(items) = value else {
        return Err(TransportError::malformed(format!(
            "expected an array of messages, got {}",
            json_type_name(&value)
        )));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value::<WireMessage>(item)
                .map_err(|e| {
                    TransportError::malformed(format!("message at index {}: {}", index, e))
                })?
                .into_message()
        })
        .collect()
}

/// Request body for send-message
pub fn encode_send_body(text: &str) -> Value {
    serde_json::json!({ "message": text })
}

/// Pull the reason out of an error body like `{"error": "Message not found"}`
pub fn error_reason(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["error", "message"]
        .iter()
        .find_map(|key| value.get(key)?.as_str().map(str::to_string))
        .filter(|reason| !reason.is_empty())
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, TransportError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Ok(ts.with_timezone(&Utc));
    }

    // Naive ISO timestamps are written in UTC by the service
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|_| TransportError::malformed(format!("invalid timestamp '{}'", text)))
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>, TransportError> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| TransportError::malformed(format!("timestamp out of range: {}", millis)))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

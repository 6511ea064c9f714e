//! Record codec for session, index and timestamp representations
//!
//! Records are written as pretty-printed JSON with RFC 3339 UTC timestamps.
//! Reading is lenient about timestamps: older records and third-party
//! exports carry naive date strings, epoch milliseconds or epoch seconds,
//! and all of them are normalized to `DateTime<Utc>`.

use crate::error::{ChatVaultError, Result};
use crate::storage::types::{validate_session_id, Session};
use anyhow::Context;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Version tag written into the index record
pub const INDEX_VERSION: &str = "1.0";

/// Persisted list of known session ids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexRecord {
    #[serde(default)]
    pub sessions: Vec<String>,
    #[serde(default = "Utc::now", with = "timestamp")]
    pub last_updated: DateTime<Utc>,
    #[serde(default = "default_index_version")]
    pub version: String,
}

fn default_index_version() -> String {
    INDEX_VERSION.to_string()
}

impl IndexRecord {
    pub fn empty() -> Self {
        Self {
            sessions: Vec::new(),
            last_updated: Utc::now(),
            version: default_index_version(),
        }
    }

    /// Append `id` unless already present; returns whether it was added
    pub fn insert(&mut self, id: &str) -> bool {
        if self.sessions.iter().any(|known| known == id) {
            return false;
        }
        self.sessions.push(id.to_string());
        self.last_updated = Utc::now();
        true
    }

    /// Remove every occurrence of `id`; returns whether anything was removed
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.sessions.len();
        self.sessions.retain(|known| known != id);
        let removed = self.sessions.len() != before;
        if removed {
            self.last_updated = Utc::now();
        }
        removed
    }
}

/// Serialize a session into record bytes
pub fn encode_session(session: &Session) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(session)
        .with_context(|| format!("Failed to serialize session {}", session.id))
}

/// Deserialize and validate a session record
pub fn decode_session(bytes: &[u8]) -> Result<Session> {
    let session: Session = serde_json::from_slice(bytes).map_err(|e| {
        ChatVaultError::Validation(format!("Malformed session record: {}", e))
    })?;
    validate_session(&session)?;
    Ok(session)
}

/// Decode a session from an already-parsed JSON value (backup bundles)
pub fn decode_session_value(value: Value) -> Result<Session> {
    let session: Session = serde_json::from_value(value).map_err(|e| {
        ChatVaultError::Validation(format!("Malformed session record: {}", e))
    })?;
    validate_session(&session)?;
    Ok(session)
}

/// Structural checks shared by decode, import and restore
pub fn validate_session(session: &Session) -> Result<()> {
    validate_session_id(&session.id)?;
    if session.title.trim().is_empty() {
        return Err(ChatVaultError::Validation(format!(
            "Session {} has an empty title",
            session.id
        ))
        .into());
    }
    Ok(())
}

pub fn encode_index(index: &IndexRecord) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(index).context("Failed to serialize session index")
}

pub fn decode_index(bytes: &[u8]) -> Result<IndexRecord> {
    serde_json::from_slice(bytes)
        .map_err(|e| ChatVaultError::Storage(format!("Malformed session index: {}", e)).into())
}

/// Canonical textual form of a timestamp, RFC3339 UTC with milliseconds
///
/// # Examples
///
/// ```
/// use chatvault::storage::codec::{format_timestamp, parse_timestamp_str};
///
/// let ts = parse_timestamp_str("2024-03-01 09:30:00").unwrap();
/// assert_eq!(format_timestamp(&ts), "2024-03-01T09:30:00.000Z");
/// ```
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Drop sub-millisecond precision so a value survives a write/read cycle
pub fn to_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(3)
}

/// Current time at the precision records are written with
pub fn now_millis() -> DateTime<Utc> {
    to_millis(Utc::now())
}

/// Parse the string timestamp shapes found in records and exports
pub fn parse_timestamp_str(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }
    if let Ok(millis) = raw.parse::<i64>() {
        return DateTime::from_timestamp_millis(millis);
    }
    None
}

/// Normalize a JSON timestamp value
///
/// Integers are epoch milliseconds, floats are epoch seconds.
pub fn normalize_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(raw) => parse_timestamp_str(raw),
        Value::Number(n) => {
            if let Some(millis) = n.as_i64() {
                DateTime::from_timestamp_millis(millis)
            } else {
                let secs = n.as_f64()?;
                if !secs.is_finite() {
                    return None;
                }
                DateTime::from_timestamp_millis((secs * 1000.0).round() as i64)
            }
        }
        _ => None,
    }
}

/// serde adapter for required timestamps
pub mod timestamp {
    use super::{format_timestamp, normalize_timestamp};
    use chrono::{DateTime, Utc};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let value = Value::deserialize(deserializer)?;
        normalize_timestamp(&value)
            .ok_or_else(|| D::Error::custom(format!("unrecognized timestamp: {}", value)))
    }
}

/// serde adapter for optional timestamps; `null` reads as `None`
pub mod timestamp_opt {
    use super::{format_timestamp, normalize_timestamp};
    use chrono::{DateTime, Utc};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(
        ts: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => serializer.serialize_str(&format_timestamp(ts)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let value = Value::deserialize(deserializer)?;
        if value.is_null() {
            return Ok(None);
        }
        normalize_timestamp(&value)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("unrecognized timestamp: {}", value)))
    }
}

//! Parsers for exported chat files
//!
//! Three stateless parsers turn raw export content into an [`ImportRecord`]:
//!
//! - markup (`.md`, `.markdown`): role marker lines split the text into turns
//! - delimited text (`.txt`): non-empty lines alternate user/assistant
//! - tagged object (`.json`): a `messages` or `conversation` array
//!
//! Record ids are derived from a SHA-256 of the file bytes, so the same
//! bytes always yield the same id.

use crate::error::{ChatVaultError, Result};
use crate::storage::codec::normalize_timestamp;
use crate::storage::Role;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;

/// Provenance marker stored in `metadata.source` of imported sessions
pub const IMPORT_SOURCE: &str = "external-export";

const ROLE_MARKER_PATTERN: &str = r"(?i)^\s*(?:#{1,3}\s*(?P<heading>user|human|assistant|claude)\s*:?\s*$|\*\*(?P<bold>user|human|assistant|claude)\s*:?\s*\*\*\s*:?\s*(?P<rest>.*)$)";

/// Export file formats understood by the importer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportFormat {
    Markdown,
    Text,
    Json,
}

impl ExportFormat {
    /// Select a format by file extension (case-insensitive)
    ///
    /// # Examples
    ///
    /// ```
    /// use chatvault::import::ExportFormat;
    /// use std::path::Path;
    ///
    /// assert_eq!(ExportFormat::from_path(Path::new("chat.MD")), Some(ExportFormat::Markdown));
    /// assert_eq!(ExportFormat::from_path(Path::new("chat.pdf")), None);
    /// ```
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "md" | "markdown" => Some(Self::Markdown),
            "txt" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Text => "text",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One turn recovered from an export
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Provenance of a parsed export
#[derive(Debug, Clone, PartialEq)]
pub struct ImportMetadata {
    pub source: String,
    pub export_format: ExportFormat,
    pub message_count: usize,
    pub estimated_duration_secs: Option<i64>,
    pub file_hash: String,
    pub source_file: Option<String>,
}

/// Normalized output of every parser
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRecord {
    pub id: String,
    pub title: String,
    pub timestamp: DateTime<Utc>,
    pub messages: Vec<ImportedMessage>,
    pub metadata: ImportMetadata,
}

impl ImportRecord {
    /// Reject records missing an id or title
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(ChatVaultError::Validation("import record has no id".to_string()).into());
        }
        if self.title.trim().is_empty() {
            return Err(
                ChatVaultError::Validation(format!("import record {} has no title", self.id))
                    .into(),
            );
        }
        Ok(())
    }

    pub fn first_content(&self) -> Option<&str> {
        self.messages.first().map(|m| m.content.as_str())
    }

    pub fn last_content(&self) -> Option<&str> {
        self.messages.last().map(|m| m.content.as_str())
    }
}

/// What a parser knows about the file besides its text
#[derive(Debug, Clone)]
pub struct SourceInfo {
    /// File stem, used as the fallback title
    pub name: String,
    pub path: Option<String>,
    pub file_hash: String,
    /// File modification time, if known
    pub modified: Option<DateTime<Utc>>,
    pub parsed_at: DateTime<Utc>,
}

impl SourceInfo {
    /// Describe `bytes` read from `path`
    pub fn for_bytes(path: &Path, bytes: &[u8], modified: Option<DateTime<Utc>>) -> Self {
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .filter(|stem| !stem.trim().is_empty())
            .unwrap_or("Imported conversation")
            .to_string();
        Self {
            name,
            path: Some(path.display().to_string()),
            file_hash: content_hash(bytes),
            modified,
            parsed_at: Utc::now(),
        }
    }

    fn record_time(&self) -> DateTime<Utc> {
        self.modified.unwrap_or(self.parsed_at)
    }

    fn record(
        &self,
        format: ExportFormat,
        title: String,
        timestamp: DateTime<Utc>,
        messages: Vec<ImportedMessage>,
        estimated_duration_secs: Option<i64>,
    ) -> ImportRecord {
        ImportRecord {
            id: derive_import_id(&self.file_hash),
            title,
            timestamp,
            metadata: ImportMetadata {
                source: IMPORT_SOURCE.to_string(),
                export_format: format,
                message_count: messages.len(),
                estimated_duration_secs,
                file_hash: self.file_hash.clone(),
                source_file: self.path.clone(),
            },
            messages,
        }
    }
}

/// Hex SHA-256 of `bytes`
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Stable session id for an export with the given content hash
pub fn derive_import_id(file_hash: &str) -> String {
    let prefix: String = file_hash.chars().take(16).collect();
    format!("import-{}", prefix)
}

/// Parse `bytes` with the parser for `format`
pub fn parse_bytes(format: ExportFormat, bytes: &[u8], source: &SourceInfo) -> Result<ImportRecord> {
    let content = std::str::from_utf8(bytes).map_err(|e| {
        ChatVaultError::Import(format!("{} is not valid UTF-8: {}", source.name, e))
    })?;
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let record = match format {
        ExportFormat::Markdown => parse_markdown(content, source)?,
        ExportFormat::Text => parse_text(content, source),
        ExportFormat::Json => parse_json(content, source)?,
    };
    record.validate()?;
    Ok(record)
}

/// Read and parse an export file, choosing the parser by extension
pub async fn parse_file(path: &Path) -> Result<ImportRecord> {
    let format = ExportFormat::from_path(path)
        .ok_or_else(|| ChatVaultError::UnsupportedFormat(path.display().to_string()))?;
    let bytes = tokio::fs::read(path).await?;
    let modified = tokio::fs::metadata(path)
        .await
        .ok()
        .and_then(|metadata| metadata.modified().ok())
        .map(DateTime::<Utc>::from);
    parse_bytes(format, &bytes, &SourceInfo::for_bytes(path, &bytes, modified))
}

fn marker_role(label: &str) -> Role {
    match label.to_lowercase().as_str() {
        "user" | "human" => Role::User,
        _ => Role::Assistant,
    }
}

/// Markup parser: marker lines open a new turn, other lines extend it
pub fn parse_markdown(content: &str, source: &SourceInfo) -> Result<ImportRecord> {
    let marker = Regex::new(ROLE_MARKER_PATTERN)
        .map_err(|e| ChatVaultError::Import(format!("Invalid role marker pattern: {}", e)))?;

    let timestamp = source.record_time();
    let mut title: Option<String> = None;
    let mut messages = Vec::new();
    let mut current: Option<(Role, Vec<&str>)> = None;

    let flush = |block: Option<(Role, Vec<&str>)>, messages: &mut Vec<ImportedMessage>| {
        if let Some((role, lines)) = block {
            let text = lines.join("\n").trim().to_string();
            if !text.is_empty() {
                messages.push(ImportedMessage {
                    role,
                    content: text,
                    timestamp,
                });
            }
        }
    };

    for line in content.lines() {
        if let Some(caps) = marker.captures(line) {
            flush(current.take(), &mut messages);
            let (label, rest) = match (caps.name("heading"), caps.name("bold")) {
                (Some(heading), _) => (heading.as_str(), None),
                (None, Some(bold)) => (bold.as_str(), caps.name("rest").map(|m| m.as_str())),
                (None, None) => continue,
            };
            let mut lines = Vec::new();
            if let Some(rest) = rest.filter(|rest| !rest.trim().is_empty()) {
                lines.push(rest);
            }
            current = Some((marker_role(label), lines));
            continue;
        }

        if title.is_none() && current.is_none() {
            if let Some(heading) = line.strip_prefix("# ") {
                let heading = heading.trim();
                if !heading.is_empty() {
                    title = Some(heading.to_string());
                    continue;
                }
            }
        }

        if let Some((_, lines)) = current.as_mut() {
            lines.push(line);
        }
    }
    flush(current.take(), &mut messages);

    let title = title.unwrap_or_else(|| source.name.clone());
    Ok(source.record(ExportFormat::Markdown, title, timestamp, messages, None))
}

/// Delimited-text parser
///
/// Approximate: explicit role labels are not recognized; non-empty lines
/// alternate user, assistant, user, ...
pub fn parse_text(content: &str, source: &SourceInfo) -> ImportRecord {
    let timestamp = source.record_time();
    let messages = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(position, line)| ImportedMessage {
            role: if position % 2 == 0 {
                Role::User
            } else {
                Role::Assistant
            },
            content: line.to_string(),
            timestamp,
        })
        .collect();

    source.record(
        ExportFormat::Text,
        source.name.clone(),
        timestamp,
        messages,
        None,
    )
}

/// Text of an entry: `content`, `text` or `message`, in that order
///
/// Content arrays of `{"type": "text", "text": ...}` blocks are joined with
/// newlines.
fn entry_content(entry: &Value) -> String {
    for key in ["content", "text", "message"] {
        match entry.get(key) {
            Some(Value::String(text)) => return text.clone(),
            Some(Value::Array(blocks)) => {
                let parts: Vec<&str> = blocks
                    .iter()
                    .filter_map(|block| match block {
                        Value::String(text) => Some(text.as_str()),
                        Value::Object(_) => block.get("text").and_then(Value::as_str),
                        _ => None,
                    })
                    .collect();
                return parts.join("\n");
            }
            _ => {}
        }
    }
    String::new()
}

/// Tagged-object parser
pub fn parse_json(content: &str, source: &SourceInfo) -> Result<ImportRecord> {
    let value: Value = serde_json::from_str(content)
        .map_err(|e| ChatVaultError::Import(format!("{}: invalid JSON: {}", source.name, e)))?;
    let object = value.as_object().ok_or_else(|| {
        ChatVaultError::Validation(format!("{}: expected a JSON object", source.name))
    })?;
    let entries = object
        .get("messages")
        .or_else(|| object.get("conversation"))
        .and_then(Value::as_array)
        .ok_or_else(|| {
            ChatVaultError::Validation(format!(
                "{}: missing `messages` or `conversation` array",
                source.name
            ))
        })?;

    let mut explicit_times = Vec::new();
    let messages: Vec<ImportedMessage> = entries
        .iter()
        .filter(|entry| entry.is_object())
        .map(|entry| {
            let role = match entry.get("role").and_then(Value::as_str) {
                Some("user") => Role::User,
                _ => Role::Assistant,
            };
            let timestamp = match entry.get("timestamp").and_then(normalize_timestamp) {
                Some(ts) => {
                    explicit_times.push(ts);
                    ts
                }
                None => source.parsed_at,
            };
            ImportedMessage {
                role,
                content: entry_content(entry),
                timestamp,
            }
        })
        .collect();

    let title = ["title", "name"]
        .iter()
        .filter_map(|key| object.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|title| !title.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| source.name.clone());

    let first = explicit_times.iter().min().copied();
    let last = explicit_times.iter().max().copied();
    let timestamp = ["created_at", "createdAt", "timestamp"]
        .iter()
        .find_map(|key| object.get(*key).and_then(normalize_timestamp))
        .or(first)
        .unwrap_or(source.parsed_at);
    let estimated_duration_secs = match (first, last) {
        (Some(first), Some(last)) if last > first => Some((last - first).num_seconds()),
        _ => None,
    };

    Ok(source.record(
        ExportFormat::Json,
        title,
        timestamp,
        messages,
        estimated_duration_secs,
    ))
}

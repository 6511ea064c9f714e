use crate::error::{ChatVaultError, Result};
use crate::storage::codec;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Current version tag written into [`SessionMetadata::version`]
pub const METADATA_VERSION: u32 = 1;

/// Speaker of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ChatVaultError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            other => Err(ChatVaultError::Validation(format!(
                "Invalid role: {}. Must be one of: user, assistant, system",
                other
            ))),
        }
    }
}

/// One utterance within a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    /// Always present; may be empty
    pub content: String,
    #[serde(with = "codec::timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl Message {
    /// Build a message with a fresh id
    pub fn new(role: Role, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: new_message_id(),
            role,
            content: content.into(),
            timestamp,
            metadata: None,
        }
    }
}

/// Message payload accepted by `SessionStore::add_message`
///
/// The store assigns the id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub role: Role,
    pub content: String,
    pub metadata: Option<Map<String, Value>>,
}

impl NewMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            metadata: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// Provenance and bookkeeping attached to a session
///
/// Known keys are typed; anything else written by other tools survives a
/// read/write cycle through `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    #[serde(default = "default_metadata_version")]
    pub version: u32,

    /// Where the session came from (e.g. `external-export`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "codec::timestamp_opt"
    )]
    pub import_date: Option<DateTime<Utc>>,

    /// SHA-256 of the imported source file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_hash: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_format: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration_secs: Option<i64>,

    #[serde(default)]
    pub total_messages: usize,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_metadata_version() -> u32 {
    METADATA_VERSION
}

impl Default for SessionMetadata {
    fn default() -> Self {
        Self {
            version: METADATA_VERSION,
            source: None,
            project: None,
            user_id: None,
            import_date: None,
            file_hash: None,
            export_format: None,
            source_file: None,
            estimated_duration_secs: None,
            total_messages: 0,
            extra: Map::new(),
        }
    }
}

/// A stored conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub title: String,
    #[serde(with = "codec::timestamp")]
    pub start_time: DateTime<Utc>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "codec::timestamp_opt"
    )]
    pub end_time: Option<DateTime<Utc>>,
    /// Chronological order
    pub messages: Vec<Message>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: SessionMetadata,
}

impl Session {
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn first_content(&self) -> Option<&str> {
        self.messages.first().map(|m| m.content.as_str())
    }

    pub fn last_content(&self) -> Option<&str> {
        self.messages.last().map(|m| m.content.as_str())
    }

    pub fn has_any_tag(&self, tags: &[String]) -> bool {
        tags.iter().any(|tag| self.tags.contains(tag))
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.messages.iter().any(|m| m.role == role)
    }

    /// Case-insensitive substring match on the title or any message content
    pub fn matches_keyword(&self, keyword: &str) -> bool {
        let needle = keyword.to_lowercase();
        self.title.to_lowercase().contains(&needle)
            || self
                .messages
                .iter()
                .any(|m| m.content.to_lowercase().contains(&needle))
    }

    /// Drop the oldest messages so at most `cap` remain; returns how many were dropped
    pub(crate) fn truncate_to(&mut self, cap: usize) -> usize {
        let overflow = self.messages.len().saturating_sub(cap);
        if overflow > 0 {
            self.messages.drain(..overflow);
        }
        self.metadata.total_messages = self.messages.len();
        overflow
    }
}

/// Fields accepted by `SessionStore::create_session`
#[derive(Debug, Clone, Default)]
pub struct NewSession {
    pub id: Option<String>,
    pub title: Option<String>,
    pub tags: Vec<String>,
    pub metadata: Option<SessionMetadata>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub messages: Vec<Message>,
}

impl NewSession {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }
}

/// Shallow update applied by `SessionStore::update_session`; `None` keeps the stored value
#[derive(Debug, Clone, Default)]
pub struct SessionUpdate {
    pub title: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<SessionMetadata>,
}

/// Result of appending a message
#[derive(Debug, Clone, PartialEq)]
pub struct AddedMessage {
    pub message: Message,
    /// Number of oldest messages dropped to honor the per-session cap
    pub evicted: usize,
}

/// Predicate and paging for `SessionStore::search_sessions`
///
/// Every populated field must match. Date bounds are exclusive.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub session_id: Option<String>,
    pub project_id: Option<String>,
    pub user_id: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    /// At least one of these must be present on the session
    pub tags: Vec<String>,
    pub keyword: Option<String>,
    pub role: Option<Role>,
    /// `None` returns every match after `offset`
    pub limit: Option<usize>,
    pub offset: usize,
}

impl SearchFilter {
    pub fn keyword(keyword: impl Into<String>) -> Self {
        Self {
            keyword: Some(keyword.into()),
            ..Self::default()
        }
    }

    pub fn matches(&self, session: &Session) -> bool {
        if let Some(id) = &self.session_id {
            if &session.id != id {
                return false;
            }
        }
        if let Some(project) = &self.project_id {
            if session.metadata.project.as_ref() != Some(project) {
                return false;
            }
        }
        if let Some(user) = &self.user_id {
            if session.metadata.user_id.as_ref() != Some(user) {
                return false;
            }
        }
        if let Some(start) = self.start_date {
            if session.start_time <= start {
                return false;
            }
        }
        if let Some(end) = self.end_date {
            if session.start_time >= end {
                return false;
            }
        }
        if !self.tags.is_empty() && !session.has_any_tag(&self.tags) {
            return false;
        }
        if let Some(keyword) = &self.keyword {
            if !session.matches_keyword(keyword) {
                return false;
            }
        }
        if let Some(role) = self.role {
            if !session.has_role(role) {
                return false;
            }
        }
        true
    }
}

/// One page of search results
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub sessions: Vec<Session>,
    pub total_count: usize,
    pub has_more: bool,
    pub current_page: usize,
    pub total_pages: usize,
}

/// Aggregate figures over the whole store
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total_sessions: usize,
    pub total_messages: usize,
    pub average_messages_per_session: f64,
    pub oldest_session: Option<DateTime<Utc>>,
    pub newest_session: Option<DateTime<Utc>>,
    pub storage_size_bytes: u64,
}

/// Generate a new sortable session id
///
/// # Examples
///
/// ```
/// use chatvault::storage::new_session_id;
///
/// let id = new_session_id();
/// assert_eq!(id.len(), 26);
/// ```
pub fn new_session_id() -> String {
    ulid::Ulid::new().to_string()
}

/// Generate a new message id
pub fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Session ids double as record file names
pub fn validate_session_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(ChatVaultError::Validation("session id cannot be empty".to_string()).into());
    }
    if id.starts_with('.') || id.contains(['/', '\\']) || id.contains('\0') {
        return Err(ChatVaultError::Validation(format!("invalid session id: {}", id)).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn session_at(start: DateTime<Utc>) -> Session {
        Session {
            id: new_session_id(),
            title: "Refactor the parser".to_string(),
            start_time: start,
            end_time: None,
            messages: vec![
                Message::new(Role::User, "Please split parse() into smaller pieces", start),
                Message::new(Role::Assistant, "Sure, here is a plan", start),
            ],
            tags: vec!["rust".to_string()],
            metadata: SessionMetadata {
                project: Some("compiler".to_string()),
                ..SessionMetadata::default()
            },
        }
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!("user".parse::<Role>().unwrap(), Role::User);
        assert_eq!("Assistant".parse::<Role>().unwrap(), Role::Assistant);
        assert_eq!(" system ".parse::<Role>().unwrap(), Role::System);
        assert!("tool".parse::<Role>().is_err());
    }

    #[test]
    fn test_truncate_keeps_most_recent() {
        let now = Utc::now();
        let mut session = session_at(now);
        session
            .messages
            .push(Message::new(Role::User, "third", now));
        let evicted = session.truncate_to(2);
        assert_eq!(evicted, 1);
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.last_content(), Some("third"));
        assert_eq!(session.metadata.total_messages, 2);
    }

    #[test]
    fn test_keyword_matches_title_or_content_case_insensitive() {
        let session = session_at(Utc::now());
        assert!(session.matches_keyword("PARSER"));
        assert!(session.matches_keyword("here is"));
        assert!(!session.matches_keyword("lexer"));
    }

    #[test]
    fn test_filter_date_bounds_are_exclusive() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let session = session_at(start);

        let on_start = SearchFilter {
            start_date: Some(start),
            ..SearchFilter::default()
        };
        assert!(!on_start.matches(&session));

        let on_end = SearchFilter {
            end_date: Some(start),
            ..SearchFilter::default()
        };
        assert!(!on_end.matches(&session));

        let around = SearchFilter {
            start_date: Some(start - Duration::seconds(1)),
            end_date: Some(start + Duration::seconds(1)),
            ..SearchFilter::default()
        };
        assert!(around.matches(&session));
    }

    #[test]
    fn test_filter_tags_role_and_project() {
        let session = session_at(Utc::now());

        let tags = SearchFilter {
            tags: vec!["python".to_string(), "rust".to_string()],
            ..SearchFilter::default()
        };
        assert!(tags.matches(&session));

        let role = SearchFilter {
            role: Some(Role::System),
            ..SearchFilter::default()
        };
        assert!(!role.matches(&session));

        let project = SearchFilter {
            project_id: Some("compiler".to_string()),
            ..SearchFilter::default()
        };
        assert!(project.matches(&session));

        let user = SearchFilter {
            user_id: Some("alice".to_string()),
            ..SearchFilter::default()
        };
        assert!(!user.matches(&session));
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(SearchFilter::default().matches(&session_at(Utc::now())));
    }

    #[test]
    fn test_validate_session_id() {
        assert!(validate_session_id("01HX5J3Q9M").is_ok());
        assert!(validate_session_id("import-abcdef").is_ok());
        assert!(validate_session_id("").is_err());
        assert!(validate_session_id("../escape").is_err());
        assert!(validate_session_id(".hidden").is_err());
        assert!(validate_session_id("a\\b").is_err());
    }

    #[test]
    fn test_metadata_preserves_unknown_keys() {
        let json = r#"{"version":1,"source":"cli","totalMessages":3,"color":"blue"}"#;
        let metadata: SessionMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.source.as_deref(), Some("cli"));
        assert_eq!(metadata.total_messages, 3);
        assert_eq!(metadata.extra.get("color"), Some(&Value::from("blue")));

        let back = serde_json::to_value(&metadata).unwrap();
        assert_eq!(back["color"], "blue");
        assert_eq!(back["totalMessages"], 3);
    }
}

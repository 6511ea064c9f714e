//! Duplicate detection for incoming import records
//!
//! Checks run in order and stop at the first positive:
//!
//! 1. exact: same title, message count, first and last content
//! 2. similarity: same import source and message count, word-set Jaccard
//!    similarity at or above the configured threshold
//! 3. fallback: only when the search itself fails, a stored session with the
//!    record's derived id counts as a duplicate

use crate::error::Result;
use crate::import::parsers::ImportRecord;
use crate::storage::{SearchFilter, SearchResult, Session, SessionStore};
use async_trait::async_trait;
use std::collections::HashSet;

/// Read access the detector needs from the store
#[async_trait]
pub trait SessionLookup: Send + Sync {
    async fn search_sessions(&self, filter: &SearchFilter) -> Result<SearchResult>;

    async fn get_session(&self, id: &str) -> Result<Option<Session>>;
}

#[async_trait]
impl SessionLookup for SessionStore {
    async fn search_sessions(&self, filter: &SearchFilter) -> Result<SearchResult> {
        SessionStore::search_sessions(self, filter).await
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>> {
        SessionStore::get_session(self, id).await
    }
}

/// Which check matched an existing session
#[derive(Debug, Clone, PartialEq)]
pub enum DuplicateMatch {
    Exact { session_id: String },
    Similar { session_id: String, similarity: f64 },
    SameId { session_id: String },
}

impl DuplicateMatch {
    pub fn session_id(&self) -> &str {
        match self {
            Self::Exact { session_id }
            | Self::Similar { session_id, .. }
            | Self::SameId { session_id } => session_id,
        }
    }

    /// Short human-readable reason, used in skip events
    pub fn describe(&self) -> String {
        match self {
            Self::Exact { session_id } => format!("exact duplicate of {}", session_id),
            Self::Similar {
                session_id,
                similarity,
            } => format!("{:.0}% similar to {}", similarity * 100.0, session_id),
            Self::SameId { session_id } => format!("session {} already exists", session_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    New,
    Duplicate(DuplicateMatch),
}

impl Verdict {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}

/// Staged duplicate detector
#[derive(Debug, Clone, Copy)]
pub struct DuplicateDetector {
    threshold: f64,
}

impl DuplicateDetector {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Decide whether `record` is already stored
    ///
    /// Errors only when the search fails and the id fallback fails too.
    pub async fn check(&self, record: &ImportRecord, lookup: &dyn SessionLookup) -> Result<Verdict> {
        let filter = SearchFilter::keyword(record.title.clone());
        let hits = match lookup.search_sessions(&filter).await {
            Ok(result) => result.sessions,
            Err(e) => {
                tracing::warn!(
                    record_id = %record.id,
                    "Duplicate search failed, falling back to id lookup: {:#}",
                    e
                );
                return self.check_by_id(record, lookup).await;
            }
        };

        if let Some(hit) = hits.iter().find(|hit| is_exact_match(record, hit)) {
            tracing::debug!(record_id = %record.id, session_id = %hit.id, "Exact duplicate");
            return Ok(Verdict::Duplicate(DuplicateMatch::Exact {
                session_id: hit.id.clone(),
            }));
        }

        let candidate_text = joined_content(record.messages.iter().map(|m| m.content.as_str()));
        for hit in hits.iter().filter(|hit| {
            hit.metadata.source.as_deref() == Some(record.metadata.source.as_str())
                && hit.message_count() == record.messages.len()
        }) {
            let stored_text = joined_content(hit.messages.iter().map(|m| m.content.as_str()));
            let similarity = jaccard_similarity(&candidate_text, &stored_text);
            if similarity >= self.threshold {
                tracing::debug!(
                    record_id = %record.id,
                    session_id = %hit.id,
                    similarity,
                    "Similar duplicate"
                );
                return Ok(Verdict::Duplicate(DuplicateMatch::Similar {
                    session_id: hit.id.clone(),
                    similarity,
                }));
            }
        }

        Ok(Verdict::New)
    }

    async fn check_by_id(&self, record: &ImportRecord, lookup: &dyn SessionLookup) -> Result<Verdict> {
        Ok(match lookup.get_session(&record.id).await? {
            Some(existing) => Verdict::Duplicate(DuplicateMatch::SameId {
                session_id: existing.id,
            }),
            None => Verdict::New,
        })
    }
}

fn is_exact_match(record: &ImportRecord, hit: &Session) -> bool {
    hit.title == record.title
        && hit.message_count() == record.messages.len()
        && hit.first_content() == record.first_content()
        && hit.last_content() == record.last_content()
}

fn joined_content<'a>(contents: impl Iterator<Item = &'a str>) -> String {
    contents.collect::<Vec<_>>().join(" ")
}

fn word_set(text: &str) -> HashSet<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

/// Jaccard similarity of the lower-cased whitespace word sets of `a` and `b`
///
/// Two texts with no words at all are treated as identical.
///
/// # Examples
///
/// ```
/// use chatvault::import::jaccard_similarity;
///
/// assert_eq!(jaccard_similarity("a b c d", "A B C D"), 1.0);
/// assert_eq!(jaccard_similarity("a b", "c d"), 0.0);
/// assert!((jaccard_similarity("a b c", "a b d") - 0.5).abs() < f64::EPSILON);
/// ```
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let left = word_set(a);
    let right = word_set(b);
    if left.is_empty() && right.is_empty() {
        return 1.0;
    }
    let shared = left.intersection(&right).count();
    let total = left.union(&right).count();
    shared as f64 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChatVaultError;
    use crate::import::parsers::{parse_text, SourceInfo, IMPORT_SOURCE};
    use crate::storage::{Message, Role, SessionMetadata};
    use chrono::Utc;
    use std::path::Path;
    use std::sync::Mutex;

    struct FakeLookup {
        sessions: Vec<Session>,
        fail_search: bool,
        lookups: Mutex<Vec<String>>,
    }

    impl FakeLookup {
        fn new(sessions: Vec<Session>) -> Self {
            Self {
                sessions,
                fail_search: false,
                lookups: Mutex::new(Vec::new()),
            }
        }

        fn failing(sessions: Vec<Session>) -> Self {
            Self {
                fail_search: true,
                ..Self::new(sessions)
            }
        }
    }

    #[async_trait]
    impl SessionLookup for FakeLookup {
        async fn search_sessions(&self, filter: &SearchFilter) -> Result<SearchResult> {
            if self.fail_search {
                return Err(ChatVaultError::Storage("disk on fire".to_string()).into());
            }
            let sessions: Vec<Session> = self
                .sessions
                .iter()
                .filter(|s| filter.matches(s))
                .cloned()
                .collect();
            Ok(SearchResult {
                total_count: sessions.len(),
                has_more: false,
                current_page: 1,
                total_pages: 1,
                sessions,
            })
        }

        async fn get_session(&self, id: &str) -> Result<Option<Session>> {
            self.lookups.lock().unwrap().push(id.to_string());
            Ok(self.sessions.iter().find(|s| s.id == id).cloned())
        }
    }

    fn record(name: &str, body: &str) -> ImportRecord {
        let src = SourceInfo::for_bytes(Path::new(name), body.as_bytes(), None);
        parse_text(body, &src)
    }

    fn stored(id: &str, title: &str, contents: &[&str], source: Option<&str>) -> Session {
        let now = Utc::now();
        Session {
            id: id.to_string(),
            title: title.to_string(),
            start_time: now,
            end_time: None,
            messages: contents
                .iter()
                .enumerate()
                .map(|(i, c)| {
                    let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
                    Message::new(role, *c, now)
                })
                .collect(),
            tags: Vec::new(),
            metadata: SessionMetadata {
                source: source.map(str::to_string),
                total_messages: contents.len(),
                ..SessionMetadata::default()
            },
        }
    }

    #[test]
    fn test_jaccard_similarity() {
        assert_eq!(jaccard_similarity("", ""), 1.0);
        assert_eq!(jaccard_similarity("word", ""), 0.0);
        assert_eq!(jaccard_similarity("Hello  World", "world hello"), 1.0);
        let ten = "a b c d e f g h i j";
        let nine_of_ten = "a b c d e f g h i k";
        let sim = jaccard_similarity(ten, nine_of_ten);
        assert!((sim - 9.0 / 11.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_exact_match() {
        let rec = record("/x/notes.txt", "first line\nmiddle\nlast line");
        let lookup = FakeLookup::new(vec![stored(
            "s1",
            "notes",
            &["first line", "something else", "last line"],
            None,
        )]);

        let verdict = DuplicateDetector::new(0.9).check(&rec, &lookup).await.unwrap();
        assert_eq!(
            verdict,
            Verdict::Duplicate(DuplicateMatch::Exact {
                session_id: "s1".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_similarity_requires_same_source() {
        let body = "one two three four five six seven eight nine ten\nalpha beta";
        let rec = record("/x/chat.txt", body);
        let changed = [
            "one two three four five six seven eight nine ten eleven",
            "alpha beta",
        ];

        let foreign = FakeLookup::new(vec![stored("s1", "chat", &changed, Some("manual"))]);
        let detector = DuplicateDetector::new(0.9);
        assert_eq!(detector.check(&rec, &foreign).await.unwrap(), Verdict::New);

        let same_source = FakeLookup::new(vec![stored("s2", "chat", &changed, Some(IMPORT_SOURCE))]);
        match detector.check(&rec, &same_source).await.unwrap() {
            Verdict::Duplicate(DuplicateMatch::Similar {
                session_id,
                similarity,
            }) => {
                assert_eq!(session_id, "s2");
                assert!(similarity >= 0.9);
            }
            other => panic!("expected similarity match, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_similarity_below_threshold_is_new() {
        let rec = record("/x/chat.txt", "red green blue\nyellow");
        let lookup = FakeLookup::new(vec![stored(
            "s1",
            "chat",
            &["red green purple", "orange"],
            Some(IMPORT_SOURCE),
        )]);
        let verdict = DuplicateDetector::new(0.9).check(&rec, &lookup).await.unwrap();
        assert_eq!(verdict, Verdict::New);
    }

    #[tokio::test]
    async fn test_fallback_on_search_failure_uses_derived_id() {
        let rec = record("/x/chat.txt", "hello\nworld");
        let existing = stored(&rec.id, "something else", &["x"], None);

        let lookup = FakeLookup::failing(vec![existing]);
        let verdict = DuplicateDetector::new(0.9).check(&rec, &lookup).await.unwrap();
        assert!(verdict.is_duplicate());
        assert_eq!(*lookup.lookups.lock().unwrap(), vec![rec.id.clone()]);

        let empty = FakeLookup::failing(Vec::new());
        let verdict = DuplicateDetector::new(0.9).check(&rec, &empty).await.unwrap();
        assert_eq!(verdict, Verdict::New);
    }

    #[tokio::test]
    async fn test_id_is_not_consulted_when_search_succeeds() {
        let rec = record("/x/chat.txt", "hello\nworld");
        let lookup = FakeLookup::new(vec![stored(&rec.id, "unrelated", &["x"], None)]);
        let verdict = DuplicateDetector::new(0.9).check(&rec, &lookup).await.unwrap();
        assert_eq!(verdict, Verdict::New);
        assert!(lookup.lookups.lock().unwrap().is_empty());
    }
}

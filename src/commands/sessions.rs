use crate::commands::{open_store, print_json, truncate};
use crate::config::Config;
use crate::error::{ChatVaultError, Result};
use crate::storage::codec::parse_timestamp_str;
use crate::storage::{NewMessage, NewSession, Role, SearchFilter, Session, SessionMetadata};
use chrono::{DateTime, Utc};
use colored::Colorize;
use prettytable::{format, Table};
use serde_json::json;

/// Search options collected from the command line
#[derive(Debug, Clone, Default)]
pub struct SearchArgs {
    pub keyword: Option<String>,
    pub tags: Vec<String>,
    pub role: Option<Role>,
    pub since: Option<String>,
    pub until: Option<String>,
    pub project: Option<String>,
    pub user: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

fn parse_bound(flag: &str, raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    match raw {
        None => Ok(None),
        Some(raw) => parse_timestamp_str(&raw).map(Some).ok_or_else(|| {
            ChatVaultError::Validation(format!("--{}: unrecognized date '{}'", flag, raw)).into()
        }),
    }
}

impl SearchArgs {
    /// Convert to a store filter, parsing the date bounds
    pub fn into_filter(self) -> Result<SearchFilter> {
        Ok(SearchFilter {
            session_id: None,
            project_id: self.project,
            user_id: self.user,
            start_date: parse_bound("since", self.since)?,
            end_date: parse_bound("until", self.until)?,
            tags: self.tags,
            keyword: self.keyword,
            role: self.role,
            limit: Some(self.limit),
            offset: self.offset,
        })
    }
}

fn sessions_table(sessions: &[Session]) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(prettytable::row![
        "ID".bold(),
        "Title".bold(),
        "Messages".bold(),
        "Tags".bold(),
        "Started".bold()
    ]);
    for session in sessions {
        table.add_row(prettytable::row![
            session.id.cyan(),
            truncate(&session.title, 40),
            session.message_count(),
            truncate(&session.tags.join(", "), 30),
            session.start_time.format("%Y-%m-%d %H:%M").to_string()
        ]);
    }
    table
}

pub async fn handle_init(config: &Config, json: bool) -> Result<()> {
    let store = open_store(config).await?;
    if json {
        return print_json(&json!({ "dataDir": store.data_dir() }));
    }
    println!(
        "{}",
        format!("Initialized session store at {}", store.data_dir().display()).green()
    );
    Ok(())
}

pub async fn handle_new(
    config: &Config,
    title: Option<String>,
    tags: Vec<String>,
    project: Option<String>,
    user: Option<String>,
    json: bool,
) -> Result<()> {
    let store = open_store(config).await?;
    let metadata = SessionMetadata {
        source: Some("cli".to_string()),
        project,
        user_id: user,
        ..SessionMetadata::default()
    };
    let session = store
        .create_session(NewSession {
            title,
            tags,
            metadata: Some(metadata),
            ..NewSession::default()
        })
        .await?;

    if json {
        return print_json(&session);
    }
    println!(
        "{} {} ({})",
        "Created session".green(),
        session.id.cyan(),
        session.title
    );
    Ok(())
}

pub async fn handle_add(
    config: &Config,
    session_id: &str,
    content: String,
    role: Role,
    json: bool,
) -> Result<()> {
    let store = open_store(config).await?;
    let added = store
        .add_message(session_id, NewMessage::new(role, content))
        .await?;

    if json {
        return print_json(&json!({
            "message": added.message,
            "evicted": added.evicted,
        }));
    }
    println!(
        "{} {} to {}",
        "Added".green(),
        added.message.role,
        session_id.cyan()
    );
    if added.evicted > 0 {
        println!(
            "{}",
            format!(
                "Evicted {} oldest message(s) to stay within {} per session",
                added.evicted, config.storage.max_messages_per_session
            )
            .yellow()
        );
    }
    Ok(())
}

pub async fn handle_show(config: &Config, id: &str, json: bool) -> Result<()> {
    let store = open_store(config).await?;
    let session = store
        .get_session(id)
        .await?
        .ok_or_else(|| ChatVaultError::NotFound(id.to_string()))?;

    if json {
        return print_json(&session);
    }

    println!("\n{} {}", session.title.bold(), format!("({})", session.id).dimmed());
    println!(
        "Started {}  |  {} message(s)  |  tags: {}",
        session.start_time.format("%Y-%m-%d %H:%M:%S"),
        session.message_count(),
        if session.tags.is_empty() {
            "-".to_string()
        } else {
            session.tags.join(", ")
        }
    );
    println!();
    for message in &session.messages {
        let label = match message.role {
            Role::User => message.role.as_str().blue().bold(),
            Role::Assistant => message.role.as_str().green().bold(),
            Role::System => message.role.as_str().magenta().bold(),
        };
        println!(
            "{} {}",
            label,
            message.timestamp.format("%H:%M:%S").to_string().dimmed()
        );
        println!("{}\n", message.content);
    }
    Ok(())
}

pub async fn handle_search(config: &Config, args: SearchArgs, json: bool) -> Result<()> {
    let store = open_store(config).await?;
    let filter = args.into_filter()?;
    let result = store.search_sessions(&filter).await?;

    if json {
        return print_json(&result);
    }
    if result.sessions.is_empty() {
        println!("{}", "No matching sessions found.".yellow());
        return Ok(());
    }

    sessions_table(&result.sessions).printstd();
    println!(
        "Page {} of {}  ({} total)",
        result.current_page, result.total_pages, result.total_count
    );
    if result.has_more {
        println!(
            "Use {} to see more.",
            format!("--offset {}", filter.offset + result.sessions.len()).cyan()
        );
    }
    Ok(())
}

pub async fn handle_delete(config: &Config, id: &str, json: bool) -> Result<()> {
    let store = open_store(config).await?;
    let deleted = store.delete_session(id).await?;

    if json {
        return print_json(&json!({ "id": id, "deleted": deleted }));
    }
    if deleted {
        println!("{}", format!("Deleted session {}", id).green());
    } else {
        println!("{}", format!("No session with id {}", id).yellow());
    }
    Ok(())
}

pub async fn handle_stats(config: &Config, json: bool) -> Result<()> {
    let store = open_store(config).await?;
    let stats = store.get_stats().await?;

    if json {
        return print_json(&stats);
    }

    let when = |ts: Option<DateTime<Utc>>| {
        ts.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string())
    };
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_CLEAN);
    table.add_row(prettytable::row!["Sessions".bold(), stats.total_sessions]);
    table.add_row(prettytable::row!["Messages".bold(), stats.total_messages]);
    table.add_row(prettytable::row![
        "Avg messages/session".bold(),
        format!("{:.1}", stats.average_messages_per_session)
    ]);
    table.add_row(prettytable::row!["Oldest".bold(), when(stats.oldest_session)]);
    table.add_row(prettytable::row!["Newest".bold(), when(stats.newest_session)]);
    table.add_row(prettytable::row![
        "Storage".bold(),
        format!("{} bytes", stats.storage_size_bytes)
    ]);
    table.printstd();
    Ok(())
}

pub async fn handle_cleanup(config: &Config, days: Option<u32>, json: bool) -> Result<()> {
    let store = open_store(config).await?;
    let days = days.or(config.storage.effective_retention_days());
    if days.is_none() && !json {
        println!("{}", "Retention is disabled; nothing to clean up.".yellow());
        return Ok(());
    }
    let deleted = store.cleanup(days).await?;

    if json {
        return print_json(&json!({ "deleted": deleted }));
    }
    println!("{}", format!("Removed {} expired session(s)", deleted).green());
    Ok(())
}

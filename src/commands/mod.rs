/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

- `sessions` — create, append, show, search, delete, stats, cleanup
- `import`   — import exported conversations
- `backup`   — create, list, restore and prune backup bundles

Handlers print either tables or, with `--json`, serde_json output.
*/

pub mod backup;
pub mod import;
pub mod sessions;

use crate::cli::{Cli, Commands};
use crate::config::Config;
use crate::error::Result;
use crate::events::TracingSink;
use crate::storage::SessionStore;
use serde::Serialize;
use std::sync::Arc;

/// Build a store for `config` and make sure its directories exist
pub async fn open_store(config: &Config) -> Result<SessionStore> {
    let store = SessionStore::new(config.storage.clone()).with_events(Arc::new(TracingSink));
    store.initialize().await?;
    Ok(store)
}

/// Pretty-print `value` as JSON on stdout
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Shorten `text` to `max` characters for table cells
pub(crate) fn truncate(text: &str, max: usize) -> String {
    let single_line = text.replace('\n', " ");
    if single_line.chars().count() > max {
        let kept: String = single_line.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        single_line
    }
}

/// Dispatch a parsed command
pub async fn run(cli: Cli, config: Config) -> Result<()> {
    let json = cli.json;
    match cli.command {
        Commands::Init => sessions::handle_init(&config, json).await,
        Commands::New {
            title,
            tags,
            project,
            user,
        } => sessions::handle_new(&config, title, tags, project, user, json).await,
        Commands::Add {
            session_id,
            content,
            role,
        } => sessions::handle_add(&config, &session_id, content, role, json).await,
        Commands::Show { id } => sessions::handle_show(&config, &id, json).await,
        Commands::Search {
            keyword,
            tags,
            role,
            since,
            until,
            project,
            user,
            limit,
            offset,
        } => {
            let query = sessions::SearchArgs {
                keyword,
                tags,
                role,
                since,
                until,
                project,
                user,
                limit,
                offset,
            };
            sessions::handle_search(&config, query, json).await
        }
        Commands::Delete { id } => sessions::handle_delete(&config, &id, json).await,
        Commands::Stats => sessions::handle_stats(&config, json).await,
        Commands::Cleanup { days } => sessions::handle_cleanup(&config, days, json).await,
        Commands::Import { paths } => import::handle_import(&config, paths, json).await,
        Commands::Backup { command } => backup::handle_backup(&config, command, json).await,
    }
}

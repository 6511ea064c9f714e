use crate::cli::BackupCommand;
use crate::commands::{open_store, print_json};
use crate::config::Config;
use crate::error::Result;
use colored::Colorize;
use prettytable::{format, Table};
use serde_json::json;

/// Handle backup commands
pub async fn handle_backup(config: &Config, command: BackupCommand, json: bool) -> Result<()> {
    let store = open_store(config).await?;

    match command {
        BackupCommand::Create { output } => {
            let created = store.create_backup(output.as_deref()).await?;
            if json {
                return print_json(&created);
            }
            println!(
                "{} {} ({} sessions, {} messages)",
                "Wrote backup".green(),
                created.path.display().to_string().cyan(),
                created.metadata.session_count,
                created.metadata.total_messages
            );
        }
        BackupCommand::List => {
            let backups = store.get_backup_list().await?;
            if json {
                return print_json(&backups);
            }
            if backups.is_empty() {
                println!("{}", "No backups found.".yellow());
                return Ok(());
            }

            let mut table = Table::new();
            table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
            table.add_row(prettytable::row![
                "File".bold(),
                "Size".bold(),
                "Modified".bold()
            ]);
            for backup in backups {
                let name = backup
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| backup.path.display().to_string());
                table.add_row(prettytable::row![
                    name.cyan(),
                    format!("{} bytes", backup.size_bytes),
                    backup.modified.format("%Y-%m-%d %H:%M:%S").to_string()
                ]);
            }
            table.printstd();
        }
        BackupCommand::Restore { path } => {
            let report = store.restore_from_backup(&path).await?;
            if json {
                return print_json(&report);
            }
            println!(
                "{} {} session(s) from {}",
                "Restored".green(),
                report.restored,
                path.display()
            );
            for error in &report.errors {
                println!("  {} {}", "skipped".red(), error);
            }
        }
        BackupCommand::Prune => {
            let removed = store.cleanup_old_backups().await?;
            if json {
                return print_json(&json!({ "removed": removed }));
            }
            println!(
                "{}",
                format!(
                    "Removed {} backup(s); keeping at most {}",
                    removed, config.storage.max_backups
                )
                .green()
            );
        }
    }

    Ok(())
}

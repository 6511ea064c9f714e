use crate::commands::{open_store, print_json, truncate};
use crate::config::Config;
use crate::error::Result;
use crate::events::TracingSink;
use crate::import::{ImportCoordinator, ImportReport};
use colored::Colorize;
use prettytable::{format, Table};
use std::path::PathBuf;
use std::sync::Arc;

/// Import the given paths, or the configured exports directory when none
pub async fn handle_import(config: &Config, paths: Vec<PathBuf>, json: bool) -> Result<()> {
    let store = Arc::new(open_store(config).await?);
    let importer =
        ImportCoordinator::new(store, config.import.clone()).with_events(Arc::new(TracingSink));

    let report = if paths.is_empty() {
        importer.import_all_exports().await?
    } else {
        importer.import_files(&paths).await
    };

    if json {
        return print_json(&report);
    }
    print_report(&report);
    Ok(())
}

fn print_report(report: &ImportReport) {
    println!(
        "{} imported, {} skipped as duplicates, {} failed",
        report.imported.to_string().green().bold(),
        report.skipped.to_string().yellow(),
        report.errors.len().to_string().red()
    );

    if report.errors.is_empty() {
        return;
    }
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(prettytable::row!["File".bold(), "Error".bold()]);
    for failure in &report.errors {
        table.add_row(prettytable::row![
            failure.path.display().to_string(),
            truncate(&failure.message, 80).red()
        ]);
    }
    table.printstd();
}

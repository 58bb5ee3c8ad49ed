//! Terminal rendering for the mirsync CLI

use console::{style, StyledObject};
use mirsync_config::Configuration;
use mirsync_engine::SyncItem;
use mirsync_types::{Error, SyncStatus};

/// Status word colored by health
pub fn styled_status(status: SyncStatus) -> StyledObject<String> {
    let label = status.to_string();
    match status {
        SyncStatus::Connected => style(label).green().bold(),
        SyncStatus::Active => style(label).cyan(),
        SyncStatus::Failed => style(label).red().bold(),
        SyncStatus::Inactive => style(label).dim(),
    }
}

/// One block per stored configuration
pub fn display_configurations(configurations: &[Configuration]) {
    if configurations.is_empty() {
        println!("{} No configurations stored", style("ℹ").yellow());
        return;
    }

    for configuration in configurations {
        println!();
        println!(
            "{} {}",
            style("⟲").blue().bold(),
            style(&configuration.name).bold().underlined()
        );
        println!("  Id: {}", style(configuration.id()).dim());
        println!(
            "  Source: {} ({})",
            style(&configuration.source).cyan(),
            configuration.source_type()
        );
        println!(
            "  Destination: {} ({})",
            style(&configuration.destination).cyan(),
            configuration.destination_type()
        );
    }
}

/// Status line for an item
pub fn display_item_status(item: &SyncItem) {
    let synced = item.last_synced().map_or_else(
        || "never".to_string(),
        |at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    );
    println!(
        "{} {} is {} (last synced: {})",
        style("•").blue(),
        style(&item.configuration().name).bold(),
        styled_status(item.status()),
        style(synced).dim()
    );
}

/// Error reported by an item
pub fn display_item_error(item: &SyncItem, error: &Error) {
    eprintln!(
        "{} {} failed: {}",
        style("✗").red().bold(),
        style(&item.configuration().name).bold(),
        error
    );
    eprintln!(
        "  {}",
        style("The item stays stopped until mirsync is restarted").dim()
    );
}

//! `jira-obsidian-sync` copies open Jira tickets into an Obsidian vault as
//! markdown notes with YAML frontmatter, through the Local REST API plugin.

/// Runtime configuration loading and validation.
pub mod config;
/// Ticket-to-note rendering.
pub mod format;
/// Jira API client and ticket field mapping.
pub mod jira;
/// Logging helpers used throughout the crate.
pub mod logging;
/// Runtime metrics counters.
pub mod metrics;
/// Obsidian Local REST API client.
pub mod obsidian;
/// Plain-text console output for the CLI.
pub mod report;
/// Create/update/skip decisions for a sync run.
pub mod sync;
/// Ticket data model.
pub mod ticket;

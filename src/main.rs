use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use jira_obsidian_sync::config::{self, AppConfig};
use jira_obsidian_sync::format::NoteFormatter;
use jira_obsidian_sync::jira::JiraClient;
use jira_obsidian_sync::logging;
use jira_obsidian_sync::metrics::Metrics;
use jira_obsidian_sync::obsidian::ObsidianClient;
use jira_obsidian_sync::report;
use jira_obsidian_sync::sync::{SyncError, SyncOptions, SyncResult, Synchronizer};
use jira_obsidian_sync::ticket::{is_valid_key, is_valid_project_key, project_of, ticket_number};

type CliResult = Result<ExitCode, Box<dyn std::error::Error>>;

#[derive(Debug, Parser)]
#[command(name = "jira-obsidian-sync", version, about = "Sync JIRA tickets into Obsidian notes")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Config file (defaults to ~/.config/jira-obsidian-sync/config.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Test connections to JIRA and Obsidian
    TestConnections,
    /// List open JIRA tickets sorted by priority
    ListJira {
        /// Only this project key (e.g. PROJ)
        #[arg(short, long)]
        project: Option<String>,
    },
    /// List synced notes in the vault
    ListObsidian {
        /// Only this project key (e.g. PROJ)
        #[arg(short, long)]
        project: Option<String>,
    },
    /// Sync JIRA tickets to Obsidian
    Sync {
        /// Sync a single ticket by key (e.g. PROJ-123)
        #[arg(short, long)]
        ticket: Option<String>,
        /// Show what would be written without writing
        #[arg(short = 'n', long)]
        dry_run: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let cfg = match config::load(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(err) => {
            logging::error(format!("{}", err));
            eprintln!("Please check your .env file or config.toml");
            return ExitCode::FAILURE;
        }
    };
    logging::set_debug(cli.verbose || cfg.logging.debug);

    let metrics = Arc::new(Metrics::new());
    let outcome = match cli.command {
        Command::TestConnections => test_connections(&cfg, &metrics),
        Command::ListJira { project } => list_jira(&cfg, &metrics, project),
        Command::ListObsidian { project } => list_obsidian(&cfg, &metrics, project),
        Command::Sync { ticket, dry_run } => sync(&cfg, &metrics, ticket, dry_run),
    };
    metrics.log_snapshot();

    match outcome {
        Ok(code) => code,
        Err(err) => {
            logging::error(format!("{}", err));
            ExitCode::FAILURE
        }
    }
}

fn project_filter(cfg: &AppConfig, project: Option<String>) -> Result<Vec<String>, String> {
    match project {
        Some(project) => {
            let project = project.trim().to_uppercase();
            if !is_valid_project_key(&project) {
                return Err(format!("invalid project key '{}'", project));
            }
            Ok(vec![project])
        }
        None => Ok(cfg.jira.projects.clone()),
    }
}

fn test_connections(cfg: &AppConfig, metrics: &Arc<Metrics>) -> CliResult {
    println!("Testing connections...\n");

    let jira = JiraClient::from_config(&cfg.jira, Arc::clone(metrics))?;
    let obsidian = ObsidianClient::from_config(&cfg.obsidian, Arc::clone(metrics))?;

    let jira_report = jira.check_connection(&cfg.jira.projects);
    let obsidian_report = obsidian.check_connection(cfg.obsidian.note_folder());

    println!("{}", report::render_jira_connection(&jira_report));
    println!("{}", report::render_obsidian_connection(&obsidian_report));

    if jira_report.is_ok() && obsidian_report.is_ok() {
        println!("All connections successful!");
        Ok(ExitCode::SUCCESS)
    } else {
        println!("Some connections failed. Please check your configuration.");
        Ok(ExitCode::FAILURE)
    }
}

fn list_jira(cfg: &AppConfig, metrics: &Arc<Metrics>, project: Option<String>) -> CliResult {
    let projects = project_filter(cfg, project)?;
    let jira = JiraClient::from_config(&cfg.jira, Arc::clone(metrics))?;

    let mut tickets = jira.search_tickets(&projects, &cfg.jira.excluded_statuses)?;
    if tickets.is_empty() {
        println!("No tickets found in {}", projects.join(", "));
        return Ok(ExitCode::SUCCESS);
    }

    tickets.sort_by(|a, b| b.priority.cmp(&a.priority));
    print!("{}", report::render_ticket_table(&tickets));
    Ok(ExitCode::SUCCESS)
}

fn list_obsidian(cfg: &AppConfig, metrics: &Arc<Metrics>, project: Option<String>) -> CliResult {
    let projects = project_filter(cfg, project)?;
    let obsidian = ObsidianClient::from_config(&cfg.obsidian, Arc::clone(metrics))?;
    let folder = cfg.obsidian.note_folder();

    let mut notes = Vec::new();
    for project in &projects {
        for path in obsidian.list(&format!("{}/{}", folder, project))? {
            let key = path
                .rsplit('/')
                .next()
                .unwrap_or(&path)
                .trim_end_matches(".md")
                .to_string();
            notes.push((key, path));
        }
    }

    if notes.is_empty() {
        println!("No notes found for {} in {}", projects.join(", "), folder);
        return Ok(ExitCode::SUCCESS);
    }

    notes.sort_by(|(a, _), (b, _)| {
        (project_of(a), ticket_number(a)).cmp(&(project_of(b), ticket_number(b)))
    });
    print!(
        "{}",
        report::render_note_table(&format!("Obsidian Notes ({} total)", notes.len()), &notes)
    );
    Ok(ExitCode::SUCCESS)
}

fn sync(
    cfg: &AppConfig,
    metrics: &Arc<Metrics>,
    ticket: Option<String>,
    dry_run: bool,
) -> CliResult {
    let jira = JiraClient::from_config(&cfg.jira, Arc::clone(metrics))?;
    let obsidian = ObsidianClient::from_config(&cfg.obsidian, Arc::clone(metrics))?;
    let formatter = NoteFormatter::new(&jira.base_url, cfg.obsidian.note_folder());
    let synchronizer = Synchronizer::new(
        &jira,
        &obsidian,
        &formatter,
        SyncOptions::from_config(cfg, dry_run),
    );

    let outcome = match &ticket {
        Some(key) => {
            let key = key.trim().to_uppercase();
            if !is_valid_key(&key) {
                return Err(format!("invalid ticket key '{}'", key).into());
            }
            logging::info(format!("syncing ticket {}", key));
            synchronizer.run_single(&key)
        }
        None => {
            logging::info(format!(
                "starting sync{} for projects {}",
                if dry_run { " (dry run)" } else { "" },
                cfg.jira.projects.join(",")
            ));
            synchronizer.run(&cfg.jira.projects, &cfg.jira.excluded_statuses)
        }
    };

    let result = match outcome {
        Ok(result) => result,
        Err(SyncError::NotFound(key)) => {
            println!("Ticket {} not found", key);
            return Ok(ExitCode::FAILURE);
        }
        Err(err) => return Err(err.into()),
    };

    print_sync_result(&result, &obsidian);

    if result.is_success() {
        if dry_run {
            println!("\nDry run completed successfully!");
        } else {
            println!("\nSync completed successfully!");
        }
        Ok(ExitCode::SUCCESS)
    } else {
        println!("\nSync completed with errors");
        Ok(ExitCode::FAILURE)
    }
}

fn print_sync_result(result: &SyncResult, obsidian: &ObsidianClient) {
    print!("{}", report::render_sync_summary(result));

    if !result.planned_writes.is_empty() {
        println!("\nDRY RUN - the following requests would be sent:\n");
        for write in &result.planned_writes {
            let endpoint = obsidian
                .vault_url(&write.path, false)
                .map(|url| url.to_string())
                .unwrap_or_else(|_| write.path.clone());
            println!("{}", report::render_planned_write(write, &endpoint));
        }
    }

    if !result.failed.is_empty() {
        println!("\nErrors encountered:");
        print!("{}", report::render_failures(result));
    }
}

use std::fmt;

use crate::config::AppConfig;
use crate::format::NoteFormatter;
use crate::jira::{JiraClient, JiraError};
use crate::logging;
use crate::obsidian::{ObsidianClient, ObsidianError};
use crate::ticket::TicketRecord;

const PREVIEW_CHARS: usize = 500;

/// Where tickets come from.
pub trait TicketSource {
    fn fetch_tickets(
        &self,
        projects: &[String],
        excluded_statuses: &[String],
    ) -> Result<Vec<TicketRecord>, JiraError>;

    fn fetch_ticket(&self, key: &str) -> Result<TicketRecord, JiraError>;
}

/// Where notes are written.
pub trait NoteStore {
    fn exists(&self, path: &str) -> Result<bool, ObsidianError>;

    fn write(&self, path: &str, content: &str) -> Result<(), ObsidianError>;
}

impl TicketSource for JiraClient {
    fn fetch_tickets(
        &self,
        projects: &[String],
        excluded_statuses: &[String],
    ) -> Result<Vec<TicketRecord>, JiraError> {
        self.search_tickets(projects, excluded_statuses)
    }

    fn fetch_ticket(&self, key: &str) -> Result<TicketRecord, JiraError> {
        self.get_ticket(key)
    }
}

impl NoteStore for ObsidianClient {
    fn exists(&self, path: &str) -> Result<bool, ObsidianError> {
        ObsidianClient::exists(self, path)
    }

    fn write(&self, path: &str, content: &str) -> Result<(), ObsidianError> {
        ObsidianClient::write(self, path, content)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("failed to fetch tickets: {0}")]
    Fetch(JiraError),
    #[error("ticket {0} not found")]
    NotFound(String),
}

impl From<JiraError> for SyncError {
    fn from(err: JiraError) -> Self {
        match err {
            JiraError::NotFound(key) => SyncError::NotFound(key),
            other => SyncError::Fetch(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteAction {
    Create,
    Update,
}

impl fmt::Display for NoteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoteAction::Create => f.write_str("CREATE"),
            NoteAction::Update => f.write_str("UPDATE"),
        }
    }
}

/// A write that a dry run would have performed.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedWrite {
    pub ticket: String,
    pub action: NoteAction,
    pub method: &'static str,
    pub path: String,
    pub content_preview: String,
    pub content_length: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncFailure {
    pub key: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncResult {
    pub tickets_found: usize,
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<SyncFailure>,
    pub dry_run: bool,
    pub planned_writes: Vec<PlannedWrite>,
}

impl SyncResult {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    pub update_existing: bool,
    pub dry_run: bool,
}

impl SyncOptions {
    pub fn from_config(config: &AppConfig, dry_run: bool) -> Self {
        Self {
            update_existing: config.obsidian.update_existing,
            dry_run,
        }
    }
}

enum Outcome {
    Written(NoteAction),
    Skipped,
}

pub struct Synchronizer<'a, S, N> {
    source: &'a S,
    store: &'a N,
    formatter: &'a NoteFormatter,
    options: SyncOptions,
}

impl<'a, S: TicketSource, N: NoteStore> Synchronizer<'a, S, N> {
    pub fn new(
        source: &'a S,
        store: &'a N,
        formatter: &'a NoteFormatter,
        options: SyncOptions,
    ) -> Self {
        Self {
            source,
            store,
            formatter,
            options,
        }
    }

    /// Fetches every open ticket of `projects` and syncs them. Only the
    /// fetch itself is fatal.
    pub fn run(
        &self,
        projects: &[String],
        excluded_statuses: &[String],
    ) -> Result<SyncResult, SyncError> {
        let tickets = self
            .source
            .fetch_tickets(projects, excluded_statuses)
            .map_err(SyncError::Fetch)?;
        logging::info(format!("found {} active tickets", tickets.len()));
        Ok(self.sync(&tickets))
    }

    pub fn run_single(&self, key: &str) -> Result<SyncResult, SyncError> {
        let ticket = self.source.fetch_ticket(key)?;
        Ok(self.sync(std::slice::from_ref(&ticket)))
    }

    pub fn sync(&self, tickets: &[TicketRecord]) -> SyncResult {
        let mut result = SyncResult {
            tickets_found: tickets.len(),
            dry_run: self.options.dry_run,
            ..SyncResult::default()
        };

        for ticket in tickets {
            match self.sync_ticket(ticket, &mut result) {
                Ok(Outcome::Written(NoteAction::Create)) => result.created.push(ticket.key.clone()),
                Ok(Outcome::Written(NoteAction::Update)) => result.updated.push(ticket.key.clone()),
                Ok(Outcome::Skipped) => result.skipped.push(ticket.key.clone()),
                Err(err) => {
                    logging::error(format!("failed to sync {}: {}", ticket.key, err));
                    result.failed.push(SyncFailure {
                        key: ticket.key.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }

        result
    }

    fn sync_ticket(
        &self,
        ticket: &TicketRecord,
        result: &mut SyncResult,
    ) -> Result<Outcome, ObsidianError> {
        let note = self.formatter.format(ticket);
        let exists = self.store.exists(&note.path)?;

        if exists && !self.options.update_existing {
            logging::info(format!("skipping existing note {}", note.path));
            return Ok(Outcome::Skipped);
        }

        let action = if exists {
            NoteAction::Update
        } else {
            NoteAction::Create
        };

        if self.options.dry_run {
            logging::info(format!("[dry run] would {} {}", action, note.path));
            result.planned_writes.push(PlannedWrite {
                ticket: ticket.key.clone(),
                action,
                method: "PUT",
                path: note.path.clone(),
                content_preview: preview(&note.content),
                content_length: note.content.len(),
            });
            return Ok(Outcome::Written(action));
        }

        self.store.write(&note.path, &note.content)?;
        match action {
            NoteAction::Create => logging::info(format!("created note {}", note.path)),
            NoteAction::Update => logging::info(format!("updated note {}", note.path)),
        }
        Ok(Outcome::Written(action))
    }
}

fn preview(content: &str) -> String {
    match content.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::{HashMap, HashSet};

    use super::*;

    fn ticket(key: &str) -> TicketRecord {
        TicketRecord {
            key: key.to_string(),
            summary: format!("Summary of {key}"),
            description: String::new(),
            status: "In Progress".to_string(),
            priority: None,
            assignee: None,
            reporter: None,
            story_points: None,
            sprint: None,
            created: "2024-01-01T10:00:00.000+0000".to_string(),
            updated: "2024-01-01T10:00:00.000+0000".to_string(),
            due_date: None,
            comments: vec![],
        }
    }

    struct FakeSource {
        tickets: Vec<TicketRecord>,
        fail_search: bool,
        fetched_keys: RefCell<Vec<String>>,
    }

    impl FakeSource {
        fn with(tickets: Vec<TicketRecord>) -> Self {
            Self {
                tickets,
                fail_search: false,
                fetched_keys: RefCell::new(Vec::new()),
            }
        }
    }

    impl TicketSource for FakeSource {
        fn fetch_tickets(
            &self,
            _projects: &[String],
            _excluded_statuses: &[String],
        ) -> Result<Vec<TicketRecord>, JiraError> {
            if self.fail_search {
                return Err(JiraError::InvalidBaseUrl("offline".into()));
            }
            Ok(self.tickets.clone())
        }

        fn fetch_ticket(&self, key: &str) -> Result<TicketRecord, JiraError> {
            self.fetched_keys.borrow_mut().push(key.to_string());
            self.tickets
                .iter()
                .find(|t| t.key == key)
                .cloned()
                .ok_or_else(|| JiraError::NotFound(key.to_string()))
        }
    }

    #[derive(Default)]
    struct FakeStore {
        existing: HashSet<String>,
        failing_writes: HashSet<String>,
        failing_lookups: HashSet<String>,
        writes: RefCell<HashMap<String, String>>,
        write_order: RefCell<Vec<String>>,
    }

    impl FakeStore {
        fn with_existing(paths: &[&str]) -> Self {
            Self {
                existing: paths.iter().map(|p| p.to_string()).collect(),
                ..Self::default()
            }
        }
    }

    impl NoteStore for FakeStore {
        fn exists(&self, path: &str) -> Result<bool, ObsidianError> {
            if self.failing_lookups.contains(path) {
                return Err(ObsidianError::InvalidPath(path.to_string()));
            }
            Ok(self.existing.contains(path))
        }

        fn write(&self, path: &str, content: &str) -> Result<(), ObsidianError> {
            if self.failing_writes.contains(path) {
                return Err(ObsidianError::Http {
                    status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                    body: "disk full".into(),
                });
            }
            self.write_order.borrow_mut().push(path.to_string());
            self.writes
                .borrow_mut()
                .insert(path.to_string(), content.to_string());
            Ok(())
        }
    }

    fn formatter() -> NoteFormatter {
        NoteFormatter::new("https://test.atlassian.net", "JIRA")
    }

    fn options(update_existing: bool, dry_run: bool) -> SyncOptions {
        SyncOptions {
            update_existing,
            dry_run,
        }
    }

    #[test]
    fn creates_missing_notes_in_received_order() {
        let source = FakeSource::with(vec![ticket("PROJ-2"), ticket("PROJ-1")]);
        let store = FakeStore::default();
        let formatter = formatter();
        let sync = Synchronizer::new(&source, &store, &formatter, options(true, false));

        let result = sync
            .run(&["PROJ".to_string()], &["Done".to_string()])
            .expect("run");

        assert_eq!(result.tickets_found, 2);
        assert_eq!(result.created, vec!["PROJ-2", "PROJ-1"]);
        assert!(result.updated.is_empty());
        assert!(result.is_success());
        assert_eq!(
            *store.write_order.borrow(),
            vec!["JIRA/PROJ/PROJ-2.md", "JIRA/PROJ/PROJ-1.md"]
        );
        let writes = store.writes.borrow();
        assert_eq!(
            writes.get("JIRA/PROJ/PROJ-1.md"),
            Some(&formatter.format(&ticket("PROJ-1")).content)
        );
    }

    #[test]
    fn skips_existing_note_when_updates_disabled() {
        let source = FakeSource::with(vec![ticket("PROJ-1"), ticket("PROJ-5")]);
        let store = FakeStore::with_existing(&["JIRA/PROJ/PROJ-1.md"]);
        let formatter = formatter();
        let sync = Synchronizer::new(&source, &store, &formatter, options(false, false));

        let result = sync.sync(&source.tickets);

        assert_eq!(result.skipped, vec!["PROJ-1"]);
        assert_eq!(result.created, vec!["PROJ-5"]);
        assert!(!store.writes.borrow().contains_key("JIRA/PROJ/PROJ-1.md"));
    }

    #[test]
    fn overwrites_existing_note_when_updates_enabled() {
        let source = FakeSource::with(vec![ticket("PROJ-1")]);
        let store = FakeStore::with_existing(&["JIRA/PROJ/PROJ-1.md"]);
        let formatter = formatter();
        let sync = Synchronizer::new(&source, &store, &formatter, options(true, false));

        let result = sync.sync(&source.tickets);

        assert_eq!(result.updated, vec!["PROJ-1"]);
        assert!(result.created.is_empty());
        assert_eq!(
            store.writes.borrow().get("JIRA/PROJ/PROJ-1.md"),
            Some(&formatter.format(&ticket("PROJ-1")).content)
        );
    }

    #[test]
    fn write_failure_is_recorded_and_run_continues() {
        let source = FakeSource::with(vec![ticket("PROJ-2"), ticket("PROJ-3")]);
        let store = FakeStore {
            failing_writes: ["JIRA/PROJ/PROJ-2.md".to_string()].into_iter().collect(),
            ..FakeStore::default()
        };
        let formatter = formatter();
        let sync = Synchronizer::new(&source, &store, &formatter, options(true, false));

        let result = sync.sync(&source.tickets);

        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].key, "PROJ-2");
        assert!(result.failed[0].message.contains("disk full"));
        assert_eq!(result.created, vec!["PROJ-3"]);
        assert!(!result.is_success());
    }

    #[test]
    fn lookup_failure_is_recorded_without_write() {
        let source = FakeSource::with(vec![ticket("PROJ-4")]);
        let store = FakeStore {
            failing_lookups: ["JIRA/PROJ/PROJ-4.md".to_string()].into_iter().collect(),
            ..FakeStore::default()
        };
        let formatter = formatter();
        let sync = Synchronizer::new(&source, &store, &formatter, options(true, false));

        let result = sync.sync(&source.tickets);

        assert_eq!(result.failed[0].key, "PROJ-4");
        assert!(store.writes.borrow().is_empty());
    }

    #[test]
    fn dry_run_plans_writes_without_performing_them() {
        let source = FakeSource::with(vec![ticket("PROJ-1"), ticket("PROJ-2"), ticket("PROJ-3")]);
        let store = FakeStore::with_existing(&["JIRA/PROJ/PROJ-2.md"]);
        let formatter = formatter();
        let sync = Synchronizer::new(&source, &store, &formatter, options(true, true));

        let result = sync.sync(&source.tickets);

        assert!(result.dry_run);
        assert!(store.writes.borrow().is_empty());
        assert_eq!(result.created, vec!["PROJ-1", "PROJ-3"]);
        assert_eq!(result.updated, vec!["PROJ-2"]);
        assert_eq!(result.planned_writes.len(), 3);

        let planned = &result.planned_writes[1];
        let content = formatter.format(&ticket("PROJ-2")).content;
        assert_eq!(planned.ticket, "PROJ-2");
        assert_eq!(planned.action, NoteAction::Update);
        assert_eq!(planned.method, "PUT");
        assert_eq!(planned.path, "JIRA/PROJ/PROJ-2.md");
        assert_eq!(planned.content_length, content.len());
        assert_eq!(planned.content_preview, content);
    }

    #[test]
    fn dry_run_still_honours_skip_rule() {
        let source = FakeSource::with(vec![ticket("PROJ-1")]);
        let store = FakeStore::with_existing(&["JIRA/PROJ/PROJ-1.md"]);
        let formatter = formatter();
        let sync = Synchronizer::new(&source, &store, &formatter, options(false, true));

        let result = sync.sync(&source.tickets);

        assert_eq!(result.skipped, vec!["PROJ-1"]);
        assert!(result.planned_writes.is_empty());
    }

    #[test]
    fn single_ticket_mode_fetches_only_that_key() {
        let source = FakeSource::with(vec![ticket("PROJ-1"), ticket("PROJ-7")]);
        let store = FakeStore::default();
        let formatter = formatter();
        let sync = Synchronizer::new(&source, &store, &formatter, options(true, false));

        let result = sync.run_single("PROJ-7").expect("single sync");

        assert_eq!(*source.fetched_keys.borrow(), vec!["PROJ-7"]);
        assert_eq!(result.tickets_found, 1);
        assert_eq!(result.created, vec!["PROJ-7"]);
        assert_eq!(store.write_order.borrow().len(), 1);
    }

    #[test]
    fn single_ticket_mode_reports_not_found() {
        let source = FakeSource::with(vec![]);
        let store = FakeStore::default();
        let formatter = formatter();
        let sync = Synchronizer::new(&source, &store, &formatter, options(true, false));

        let err = sync.run_single("PROJ-404").expect_err("missing ticket");
        assert!(matches!(err, SyncError::NotFound(key) if key == "PROJ-404"));
    }

    #[test]
    fn fetch_failure_aborts_run() {
        let mut source = FakeSource::with(vec![ticket("PROJ-1")]);
        source.fail_search = true;
        let store = FakeStore::default();
        let formatter = formatter();
        let sync = Synchronizer::new(&source, &store, &formatter, options(true, false));

        let err = sync.run(&["PROJ".to_string()], &[]).expect_err("fetch fails");
        assert!(matches!(err, SyncError::Fetch(_)));
        assert!(store.writes.borrow().is_empty());
    }

    #[test]
    fn preview_truncates_long_content() {
        let long = "é".repeat(600);
        let cut = preview(&long);
        assert_eq!(cut.chars().count(), PREVIEW_CHARS + 3);
        assert!(cut.ends_with("..."));
        assert_eq!(preview("short"), "short");
    }
}

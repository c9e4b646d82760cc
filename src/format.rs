use chrono::{DateTime, FixedOffset};

use crate::ticket::TicketRecord;

/// A rendered note and the vault-relative path it belongs at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteDocument {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct NoteFormatter {
    server_url: String,
    folder: String,
}

impl NoteFormatter {
    pub fn new(server_url: &str, folder: &str) -> Self {
        Self {
            server_url: server_url.trim().trim_end_matches('/').to_string(),
            folder: folder.trim().trim_matches('/').to_string(),
        }
    }

    pub fn note_path(&self, ticket: &TicketRecord) -> String {
        note_path(&self.folder, ticket.project(), &ticket.key)
    }

    pub fn browse_url(&self, key: &str) -> String {
        format!("{}/browse/{}", self.server_url, key)
    }

    pub fn format(&self, ticket: &TicketRecord) -> NoteDocument {
        let mut sections = vec![
            render_frontmatter(ticket),
            format!("# {} {}", ticket.key, single_line(&ticket.summary)),
        ];

        let description = ticket.description.trim();
        if !description.is_empty() {
            sections.push("## Description".to_string());
            sections.push(description.to_string());
        }

        if !ticket.comments.is_empty() {
            sections.push("## Comments".to_string());
            for comment in &ticket.comments {
                let mut block = format!(
                    "### {} - {}",
                    comment.author,
                    display_timestamp(&comment.created)
                );
                let body = comment.body.trim();
                if !body.is_empty() {
                    block.push_str("\n\n");
                    block.push_str(body);
                }
                sections.push(block);
            }
        }

        sections.push(format!("---\n[View in JIRA]({})", self.browse_url(&ticket.key)));

        let mut content = sections.join("\n\n");
        content.push('\n');

        NoteDocument {
            path: self.note_path(ticket),
            content,
        }
    }
}

pub fn note_path(folder: &str, project: &str, key: &str) -> String {
    let folder = folder.trim().trim_matches('/');
    if folder.is_empty() {
        format!("{}/{}.md", project, key)
    } else {
        format!("{}/{}/{}.md", folder, project, key)
    }
}

pub fn status_slug(status: &str) -> String {
    status
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}

pub fn tags(ticket: &TicketRecord) -> [String; 3] {
    [
        "jira".to_string(),
        ticket.project().to_lowercase(),
        status_slug(&ticket.status),
    ]
}

fn render_frontmatter(ticket: &TicketRecord) -> String {
    let mut lines = vec!["---".to_string(), "aliases:".to_string()];
    lines.push(format!("  - {}", yaml_scalar(&ticket.key)));

    if let Some(assignee) = non_blank(ticket.assignee.as_deref()) {
        lines.push(format!("assignee: {}", wiki_link(assignee)));
    }
    if let Some(reporter) = non_blank(ticket.reporter.as_deref()) {
        lines.push(format!("reporter: {}", wiki_link(reporter)));
    }
    if let Some(priority) = &ticket.priority {
        lines.push(format!("priority: {}", yaml_scalar(&priority.to_string())));
    }
    lines.push(format!("status: {}", yaml_scalar(&ticket.status)));
    lines.push(format!("project: {}", yaml_scalar(ticket.project())));
    lines.push(format!("key: {}", yaml_scalar(&ticket.key)));

    if let Some(points) = ticket.story_points {
        lines.push(format!("story_points: {}", format_points(points)));
    }
    if let Some(sprint) = non_blank(ticket.sprint.as_deref()) {
        lines.push(format!("sprint: {}", yaml_scalar(sprint)));
    }

    lines.push(format!(
        "created: {}",
        yaml_scalar(&display_timestamp(&ticket.created))
    ));
    if let Some(due) = non_blank(ticket.due_date.as_deref()) {
        lines.push(format!("due_date: {}", yaml_scalar(due)));
    }
    lines.push(format!(
        "updated: {}",
        yaml_scalar(&display_timestamp(&ticket.updated))
    ));

    lines.push("tags:".to_string());
    for tag in tags(ticket) {
        lines.push(format!("  - {}", yaml_scalar(&tag)));
    }

    lines.push("---".to_string());
    lines.join("\n")
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn wiki_link(name: &str) -> String {
    format!("\"[[{}]]\"", escape_double_quoted(name))
}

fn escape_double_quoted(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn format_points(points: f64) -> String {
    if points.fract() == 0.0 && points.abs() < 1e15 {
        format!("{}", points as i64)
    } else {
        format!("{}", points)
    }
}

/// Jira timestamps (`2024-01-01T10:00:00.000+0000`) become
/// `2024-01-01 10:00` in their own offset; anything else is kept as is.
pub fn display_timestamp(raw: &str) -> String {
    let raw = raw.trim();
    parse_timestamp(raw)
        .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| raw.to_string())
}

fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z")
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
}

/// Quotes a plain YAML scalar only when it would otherwise change meaning.
fn yaml_scalar(value: &str) -> String {
    if needs_quoting(value) {
        format!("\"{}\"", escape_double_quoted(value))
    } else {
        value.to_string()
    }
}

fn needs_quoting(value: &str) -> bool {
    let Some(first) = value.chars().next() else {
        return true;
    };
    if value != value.trim() {
        return true;
    }
    if matches!(
        first,
        '-' | '?' | ':' | ',' | '[' | ']' | '{' | '}' | '#' | '&' | '*' | '!' | '|' | '>' | '\''
            | '"' | '%' | '@' | '`'
    ) {
        return true;
    }
    if value.contains(": ") || value.contains(" #") || value.ends_with(':') {
        return true;
    }
    if value.chars().any(|c| c.is_control()) {
        return true;
    }
    if looks_numeric(value) {
        return true;
    }
    matches!(
        value.to_ascii_lowercase().as_str(),
        "true" | "false" | "yes" | "no" | "on" | "off" | "null" | "~"
    )
}

fn looks_numeric(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    let unsigned = lower.trim_start_matches(['+', '-']);
    value.parse::<f64>().is_ok()
        || unsigned.starts_with("0x")
        || unsigned.starts_with("0o")
        || unsigned.starts_with(".inf")
        || lower == ".nan"
        || (unsigned.starts_with(|c: char| c.is_ascii_digit())
            && unsigned.replace('_', "").parse::<f64>().is_ok())
}

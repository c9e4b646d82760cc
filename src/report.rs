use crate::jira::{JiraConnectionReport, JiraError};
use crate::obsidian::ObsidianConnectionReport;
use crate::sync::{PlannedWrite, SyncResult};
use crate::ticket::TicketRecord;

/// Left-aligned plain-text table with a title line and a header rule.
pub fn render_table(title: &str, headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(widths.len()) {
            widths[idx] = widths[idx].max(cell.chars().count());
        }
    }

    let format_row = |cells: Vec<&str>| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = format!("{}\n", title);
    out.push_str(&format_row(headers.to_vec()));
    out.push('\n');
    out.push_str(
        &widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("  "),
    );
    out.push('\n');
    for row in rows {
        out.push_str(&format_row(row.iter().map(String::as_str).collect()));
        out.push('\n');
    }
    out
}

pub fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let cut: String = value.chars().take(max_chars).collect();
    format!("{}...", cut)
}

pub fn render_ticket_table(tickets: &[TicketRecord]) -> String {
    let rows: Vec<Vec<String>> = tickets
        .iter()
        .map(|t| {
            vec![
                t.key.clone(),
                t.priority
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "None".to_string()),
                t.status.clone(),
                t.assignee.clone().unwrap_or_else(|| "Unassigned".to_string()),
                truncate(&t.summary, 80),
            ]
        })
        .collect();
    render_table(
        &format!("JIRA Tickets ({} total)", tickets.len()),
        &["Key", "Priority", "Status", "Assignee", "Summary"],
        &rows,
    )
}

pub fn render_note_table(title: &str, notes: &[(String, String)]) -> String {
    let rows: Vec<Vec<String>> = notes
        .iter()
        .map(|(ticket, path)| vec![ticket.clone(), path.clone()])
        .collect();
    render_table(title, &["Ticket", "Path"], &rows)
}

pub fn render_sync_summary(result: &SyncResult) -> String {
    let title = if result.dry_run {
        "Sync Results (DRY RUN)"
    } else {
        "Sync Results"
    };
    let rows = vec![
        vec!["Tickets Found".to_string(), result.tickets_found.to_string()],
        vec!["Notes Created".to_string(), result.created.len().to_string()],
        vec!["Notes Updated".to_string(), result.updated.len().to_string()],
        vec!["Notes Skipped".to_string(), result.skipped.len().to_string()],
        vec!["Errors".to_string(), result.failed.len().to_string()],
    ];
    render_table(title, &["Metric", "Value"], &rows)
}

pub fn render_planned_write(write: &PlannedWrite, endpoint: &str) -> String {
    format!(
        "== {ticket} ==\nAction: {action}\nFile Path: {path}\nHTTP Method: {method}\nAPI Endpoint: {endpoint}\nContent Length: {length} bytes\n\nHeaders:\n  Authorization: Bearer [REDACTED]\n  Content-Type: text/markdown\n\nContent Preview:\n{preview}\n",
        ticket = write.ticket,
        action = write.action,
        path = write.path,
        method = write.method,
        endpoint = endpoint,
        length = write.content_length,
        preview = write.content_preview,
    )
}

pub fn render_failures(result: &SyncResult) -> String {
    let mut out = String::new();
    for failure in &result.failed {
        out.push_str(&format!("  * {}: {}\n", failure.key, failure.message));
    }
    out
}

pub fn render_jira_connection(report: &Result<JiraConnectionReport, JiraError>) -> String {
    match report {
        Ok(report) => {
            let accessible = report
                .accessible_projects
                .iter()
                .map(|p| p.key.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            let mut user = report
                .user
                .display_name
                .as_deref()
                .unwrap_or("Unknown")
                .to_string();
            if let Some(email) = &report.user.email_address {
                user.push_str(&format!(" <{}>", email));
            }
            format!(
                "JIRA: connected\n  Server: {}\n  Version: {}\n  User: {}\n  Accessible projects: {}\n  Inaccessible projects: {}\n",
                report.server.title.as_deref().unwrap_or("Unknown"),
                report.server.version.as_deref().unwrap_or("Unknown"),
                user,
                accessible,
                report.inaccessible_projects.join(", "),
            )
        }
        Err(err) => format!("JIRA: connection failed\n  Error: {}\n", err),
    }
}

pub fn render_obsidian_connection(report: &ObsidianConnectionReport) -> String {
    if report.is_ok() {
        format!(
            "Obsidian: connected and authenticated\n  API Version: {}\n  Folder exists: {}\n  Folder path: {}\n",
            report.api_version.as_deref().unwrap_or("Unknown"),
            if report.folder_exists { "Yes" } else { "No" },
            report.folder,
        )
    } else if report.connected {
        format!(
            "Obsidian: connected but not authenticated\n  Error: {}\n",
            report.error.as_deref().unwrap_or("Unknown error")
        )
    } else {
        format!(
            "Obsidian: connection failed\n  Error: {}\n",
            report.error.as_deref().unwrap_or("Unknown error")
        )
    }
}

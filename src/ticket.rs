use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

static KEY_PATTERN: OnceLock<Regex> = OnceLock::new();
static PROJECT_PATTERN: OnceLock<Regex> = OnceLock::new();

/// Ticket priority. Variant order is the ranking: `Highest` compares
/// greatest, unrecognised instance-specific names compare lowest.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Other(String),
    Lowest,
    Low,
    Medium,
    High,
    Highest,
}

impl Priority {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "highest" => Priority::Highest,
            "high" => Priority::High,
            "medium" => Priority::Medium,
            "low" => Priority::Low,
            "lowest" => Priority::Lowest,
            _ => Priority::Other(name.trim().to_string()),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Highest => f.write_str("Highest"),
            Priority::High => f.write_str("High"),
            Priority::Medium => f.write_str("Medium"),
            Priority::Low => f.write_str("Low"),
            Priority::Lowest => f.write_str("Lowest"),
            Priority::Other(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TicketComment {
    pub author: String,
    pub created: String,
    pub body: String,
}

/// Snapshot of one ticket as fetched during a run.
#[derive(Debug, Clone, PartialEq)]
pub struct TicketRecord {
    pub key: String,
    pub summary: String,
    pub description: String,
    pub status: String,
    pub priority: Option<Priority>,
    pub assignee: Option<String>,
    pub reporter: Option<String>,
    pub story_points: Option<f64>,
    pub sprint: Option<String>,
    pub created: String,
    pub updated: String,
    pub due_date: Option<String>,
    pub comments: Vec<TicketComment>,
}

impl TicketRecord {
    /// Project key taken from the ticket key prefix (`PROJ-123` -> `PROJ`).
    pub fn project(&self) -> &str {
        project_of(&self.key)
    }
}

pub fn project_of(key: &str) -> &str {
    key.rsplit_once('-').map(|(project, _)| project).unwrap_or(key)
}

pub fn is_valid_key(key: &str) -> bool {
    KEY_PATTERN
        .get_or_init(|| Regex::new(r"^[A-Z][A-Z0-9_]*-[0-9]+$").expect("valid key regex"))
        .is_match(key)
}

pub fn is_valid_project_key(project: &str) -> bool {
    PROJECT_PATTERN
        .get_or_init(|| Regex::new(r"^[A-Z][A-Z0-9_]*$").expect("valid project regex"))
        .is_match(project)
}

/// Numeric part of a ticket key, used to order notes by ticket number.
pub fn ticket_number(key: &str) -> Option<u64> {
    key.rsplit_once('-')
        .and_then(|(_, number)| number.parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priorities_rank_from_highest_to_lowest() {
        let mut values = vec![
            Priority::Low,
            Priority::Other("Blocker".into()),
            Priority::Highest,
            Priority::Medium,
            Priority::Lowest,
            Priority::High,
        ];
        values.sort_by(|a, b| b.cmp(a));

        assert_eq!(
            values,
            vec![
                Priority::Highest,
                Priority::High,
                Priority::Medium,
                Priority::Low,
                Priority::Lowest,
                Priority::Other("Blocker".into()),
            ]
        );
    }

    #[test]
    fn parses_priority_names_case_insensitively() {
        assert_eq!(Priority::from_name("HIGH"), Priority::High);
        assert_eq!(Priority::from_name(" lowest "), Priority::Lowest);
        assert_eq!(Priority::from_name("P1"), Priority::Other("P1".into()));
        assert_eq!(Priority::from_name("medium").to_string(), "Medium");
    }

    #[test]
    fn derives_project_from_key_prefix() {
        assert_eq!(project_of("PROJ-123"), "PROJ");
        assert_eq!(project_of("MY_TEAM2-7"), "MY_TEAM2");
        assert_eq!(ticket_number("PROJ-123"), Some(123));
        assert_eq!(ticket_number("PROJ"), None);
    }

    #[test]
    fn validates_ticket_keys() {
        assert!(is_valid_key("PROJ-1"));
        assert!(is_valid_key("AB2-9001"));
        assert!(!is_valid_key("proj-1"));
        assert!(!is_valid_key("PROJ-"));
        assert!(!is_valid_key("PROJ-1; DROP"));
        assert!(is_valid_project_key("OPS"));
        assert!(!is_valid_project_key("ops team"));
    }
}

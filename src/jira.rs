use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::config::{FieldMapping, JiraConfig};
use crate::logging;
use crate::metrics::Metrics;
use crate::ticket::{Priority, TicketComment, TicketRecord};

static LEGACY_SPRINT_NAME: OnceLock<Regex> = OnceLock::new();

#[derive(Debug, Clone)]
pub struct JiraIdentity {
    pub display_name: Option<String>,
    pub email_address: Option<String>,
}

#[derive(Debug, Clone)]
pub struct JiraServerInfo {
    pub title: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JiraProject {
    pub key: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct JiraConnectionReport {
    pub server: JiraServerInfo,
    pub user: JiraIdentity,
    pub accessible_projects: Vec<JiraProject>,
    pub inaccessible_projects: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum JiraError {
    #[error("jira request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("jira returned HTTP {status}: {body}")]
    Http {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("failed to decode jira response: {source}; body: {body}")]
    Decode {
        source: serde_json::Error,
        body: String,
    },
    #[error("invalid JIRA_SERVER '{0}'")]
    InvalidBaseUrl(String),
    #[error("ticket {0} not found")]
    NotFound(String),
}

#[derive(Debug, Clone)]
pub struct JiraClient {
    pub base_url: String,
    pub email: String,
    pub api_token: String,
    pub http: Client,
    fields: FieldMapping,
    max_results: usize,
    metrics: Arc<Metrics>,
}

impl JiraClient {
    pub fn new(base_url: String, email: String, api_token: String) -> Result<Self, JiraError> {
        Self::new_with_metrics(base_url, email, api_token, Arc::new(Metrics::new()))
    }

    pub fn new_with_metrics(
        base_url: String,
        email: String,
        api_token: String,
        metrics: Arc<Metrics>,
    ) -> Result<Self, JiraError> {
        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;
        let normalized_base_url = normalize_base_url(&base_url)?;
        Ok(Self {
            base_url: normalized_base_url,
            email,
            api_token,
            http,
            fields: FieldMapping::default(),
            max_results: 100,
            metrics,
        })
    }

    pub fn from_config(config: &JiraConfig, metrics: Arc<Metrics>) -> Result<Self, JiraError> {
        Ok(Self::new_with_metrics(
            config.server.clone(),
            config.email.clone(),
            config.api_token.clone(),
            metrics,
        )?
        .with_fields(config.fields.clone())
        .with_max_results(config.max_results))
    }

    pub fn with_fields(mut self, fields: FieldMapping) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self
    }

    fn send(&self, request: RequestBuilder) -> Result<Response, JiraError> {
        self.metrics.inc_jira_request();
        let response = request
            .basic_auth(&self.email, Some(&self.api_token))
            .header("Accept", "application/json")
            .send()
            .map_err(|err| {
                logging::warn(format!("jira request transport error: {}", err));
                JiraError::Request(err)
            })?;

        if !response.status().is_success() {
            logging::debug(format!(
                "jira request {} completed with status {}",
                response.url().path(),
                response.status()
            ));
        }
        Ok(response)
    }

    fn get_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, JiraError> {
        let response = self.send(request)?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(JiraError::Http { status, body });
        }

        let body = response.text()?;
        serde_json::from_str(&body).map_err(|source| JiraError::Decode {
            source,
            body: shorten(&body),
        })
    }

    fn requested_fields(&self) -> String {
        [
            "summary",
            "description",
            "status",
            "priority",
            "assignee",
            "reporter",
            "created",
            "updated",
            "duedate",
            "comment",
            self.fields.story_points.as_str(),
            self.fields.sprint.as_str(),
        ]
        .join(",")
    }

    /// Fetches open tickets for `projects` in a single search request.
    pub fn search_tickets(
        &self,
        projects: &[String],
        excluded_statuses: &[String],
    ) -> Result<Vec<TicketRecord>, JiraError> {
        if projects.is_empty() {
            return Ok(Vec::new());
        }

        let jql = build_jql(projects, excluded_statuses);
        logging::info(format!("fetching tickets with jql '{}'", jql));

        let url = format!("{}/rest/api/3/search/jql", self.base_url);
        let payload: SearchResponse = self.get_json(self.http.get(&url).query(&[
            ("jql", jql.clone()),
            ("fields", self.requested_fields()),
            ("maxResults", self.max_results.to_string()),
        ]))?;

        let returned = payload.issues.len();
        let truncated = payload.is_last == Some(false)
            || payload
                .next_page_token
                .as_ref()
                .map(|token| !token.is_empty())
                .unwrap_or(false)
            || payload.total.map(|total| total > returned).unwrap_or(false);
        if truncated {
            logging::warn(format!(
                "jira search returned the first {} tickets only; raise jira.max_results to sync more",
                returned
            ));
        }

        let tickets: Vec<TicketRecord> = payload
            .issues
            .into_iter()
            .map(|issue| ticket_from_issue(issue, &self.fields))
            .collect();
        logging::debug(format!("jira search returned {} tickets", tickets.len()));
        Ok(tickets)
    }

    pub fn get_ticket(&self, ticket_key: &str) -> Result<TicketRecord, JiraError> {
        let url = format!("{}/rest/api/3/issue/{}", self.base_url, ticket_key);
        let result: Result<IssueResponse, JiraError> = self.get_json(
            self.http
                .get(&url)
                .query(&[("fields", self.requested_fields())]),
        );

        match result {
            Ok(issue) => Ok(ticket_from_issue(issue, &self.fields)),
            Err(JiraError::Http { status, .. }) if status == reqwest::StatusCode::NOT_FOUND => {
                Err(JiraError::NotFound(ticket_key.to_string()))
            }
            Err(err) => Err(err),
        }
    }

    pub fn get_server_info(&self) -> Result<JiraServerInfo, JiraError> {
        let url = format!("{}/rest/api/3/serverInfo", self.base_url);
        let payload: ServerInfoResponse = self.get_json(self.http.get(&url))?;
        Ok(JiraServerInfo {
            title: payload.server_title,
            version: payload.version,
        })
    }

    pub fn get_myself(&self) -> Result<JiraIdentity, JiraError> {
        let url = format!("{}/rest/api/3/myself", self.base_url);
        let payload: MyselfResponse = self.get_json(self.http.get(&url))?;

        Ok(JiraIdentity {
            display_name: payload.display_name,
            email_address: payload.email_address,
        })
    }

    pub fn get_project(&self, project_key: &str) -> Result<JiraProject, JiraError> {
        let url = format!("{}/rest/api/3/project/{}", self.base_url, project_key);
        let payload: ProjectInfo = self.get_json(self.http.get(&url))?;
        Ok(JiraProject {
            key: payload.key,
            name: payload.name.unwrap_or_default(),
        })
    }

    /// Verifies credentials and reports which configured projects are
    /// visible. Transport and authentication failures are returned as
    /// errors; a project the user cannot see is only listed as inaccessible.
    pub fn check_connection(&self, projects: &[String]) -> Result<JiraConnectionReport, JiraError> {
        let server = self.get_server_info()?;
        let user = self.get_myself()?;

        let mut accessible_projects = Vec::new();
        let mut inaccessible_projects = Vec::new();
        for project in projects {
            match self.get_project(project) {
                Ok(info) => accessible_projects.push(info),
                Err(JiraError::Request(err)) => return Err(JiraError::Request(err)),
                Err(err) => {
                    logging::debug(format!("project {} is not accessible: {}", project, err));
                    inaccessible_projects.push(project.clone());
                }
            }
        }

        Ok(JiraConnectionReport {
            server,
            user,
            accessible_projects,
            inaccessible_projects,
        })
    }
}

pub fn build_jql(projects: &[String], excluded_statuses: &[String]) -> String {
    let mut jql = format!("project in ({})", jql_list(projects));
    if !excluded_statuses.is_empty() {
        jql.push_str(&format!(" AND status NOT IN ({})", jql_list(excluded_statuses)));
    }
    jql.push_str(" ORDER BY priority DESC");
    jql
}

fn jql_list(values: &[String]) -> String {
    values
        .iter()
        .map(|value| format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect::<Vec<_>>()
        .join(",")
}

fn normalize_base_url(raw: &str) -> Result<String, JiraError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(JiraError::InvalidBaseUrl(raw.to_string()));
    }

    let mut candidate = trimmed.to_string();

    if candidate.starts_with("https://https//") {
        candidate = candidate.replacen("https://https//", "https://", 1);
    } else if candidate.starts_with("http://http//") {
        candidate = candidate.replacen("http://http//", "http://", 1);
    }

    if candidate.starts_with("https//") {
        candidate = format!("https://{}", candidate.trim_start_matches("https//"));
    } else if candidate.starts_with("http//") {
        candidate = format!("http://{}", candidate.trim_start_matches("http//"));
    } else if !candidate.starts_with("https://") && !candidate.starts_with("http://") {
        candidate = format!("https://{candidate}");
    }

    let parsed =
        reqwest::Url::parse(&candidate).map_err(|_| JiraError::InvalidBaseUrl(raw.to_string()))?;
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

fn shorten(body: &str) -> String {
    if body.len() > 1000 {
        let cut = (0..=1000)
            .rev()
            .find(|idx| body.is_char_boundary(*idx))
            .unwrap_or(0);
        format!("{}...", &body[..cut])
    } else {
        body.to_string()
    }
}

fn ticket_from_issue(issue: IssueResponse, mapping: &FieldMapping) -> TicketRecord {
    let fields = issue.fields;
    let comments = fields
        .comment
        .map(|c| {
            c.comments
                .into_iter()
                .map(|comment| TicketComment {
                    author: comment
                        .author
                        .and_then(|a| a.display_name)
                        .unwrap_or_else(|| "Unknown".to_string()),
                    created: comment.created.unwrap_or_default(),
                    body: adf_to_markdown(&comment.body),
                })
                .collect()
        })
        .unwrap_or_default();

    TicketRecord {
        key: issue.key,
        summary: fields.summary.unwrap_or_default(),
        description: fields
            .description
            .as_ref()
            .map(adf_to_markdown)
            .unwrap_or_default(),
        status: fields
            .status
            .and_then(|s| s.name)
            .unwrap_or_else(|| "Unknown".to_string()),
        priority: fields
            .priority
            .and_then(|p| p.name)
            .filter(|name| !name.trim().is_empty() && name != "None")
            .map(|name| Priority::from_name(&name)),
        assignee: fields.assignee.and_then(|a| a.display_name),
        reporter: fields.reporter.and_then(|r| r.display_name),
        story_points: fields
            .custom
            .get(&mapping.story_points)
            .and_then(story_points_from),
        sprint: fields.custom.get(&mapping.sprint).and_then(sprint_from),
        created: fields.created.unwrap_or_default(),
        updated: fields.updated.unwrap_or_default(),
        due_date: fields.duedate.filter(|d| !d.trim().is_empty()),
        comments,
    }
}

fn story_points_from(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Sprint fields hold an array of sprints; the last one is the current
/// sprint. Older servers serialise each sprint as `...[id=1,name=Sprint 4,...]`.
fn sprint_from(value: &Value) -> Option<String> {
    let entry = match value {
        Value::Array(items) => items.last()?,
        other => other,
    };

    let name = match entry {
        Value::Object(map) => map.get("name").and_then(Value::as_str).map(str::to_string),
        Value::String(raw) => LEGACY_SPRINT_NAME
            .get_or_init(|| Regex::new(r"name=([^,\]]+)").expect("valid sprint regex"))
            .captures(raw)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string()),
        _ => None,
    };
    name.filter(|n| !n.trim().is_empty())
}

/// Renders Atlassian Document Format to markdown. Plain strings (older API
/// versions) pass through unchanged.
pub fn adf_to_markdown(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => render_node(other).trim().to_string(),
    }
}

fn render_node(value: &Value) -> String {
    let map = match value {
        Value::Object(map) => map,
        Value::Array(items) => return render_blocks(items, "\n\n"),
        Value::String(s) => return s.clone(),
        _ => return String::new(),
    };

    let children = || {
        map.get("content")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    };
    let attr = |name: &str| map.get("attrs").and_then(|attrs| attrs.get(name));

    match map.get("type").and_then(Value::as_str).unwrap_or_default() {
        "text" => render_text(map),
        "hardBreak" => "\n".to_string(),
        "mention" | "emoji" | "date" | "status" => attr("text")
            .or_else(|| attr("shortName"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        "inlineCard" | "blockCard" => attr("url")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        "paragraph" => render_inline(children()),
        "heading" => {
            let level = attr("level").and_then(Value::as_u64).unwrap_or(1).clamp(1, 6);
            format!("{} {}", "#".repeat(level as usize), render_inline(children()))
        }
        "codeBlock" => {
            let language = attr("language").and_then(Value::as_str).unwrap_or_default();
            format!("```{}\n{}\n```", language, render_inline(children()))
        }
        "rule" => "---".to_string(),
        "blockquote" => render_blocks(children(), "\n\n")
            .lines()
            .map(|line| format!("> {line}"))
            .collect::<Vec<_>>()
            .join("\n"),
        "bulletList" => render_list(children(), |_| "- ".to_string()),
        "orderedList" => render_list(children(), |idx| format!("{}. ", idx + 1)),
        "listItem" => render_blocks(children(), "\n"),
        _ => {
            if let Some(Value::String(text)) = map.get("text") {
                return text.clone();
            }
            render_blocks(children(), "\n\n")
        }
    }
}

fn render_inline(items: &[Value]) -> String {
    items.iter().map(render_node).collect()
}

fn render_blocks(items: &[Value], separator: &str) -> String {
    items
        .iter()
        .map(render_node)
        .filter(|s| !s.trim().is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}

fn render_list(items: &[Value], marker: impl Fn(usize) -> String) -> String {
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            let prefix = marker(idx);
            let indent = " ".repeat(prefix.len());
            let body = render_node(item);
            let mut lines = body.lines();
            let mut out = format!("{}{}", prefix, lines.next().unwrap_or_default());
            for line in lines {
                out.push('\n');
                if !line.is_empty() {
                    out.push_str(&indent);
                    out.push_str(line);
                }
            }
            out
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_text(map: &Map<String, Value>) -> String {
    let mut text = map
        .get("text")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let marks = map.get("marks").and_then(Value::as_array);
    for mark in marks.into_iter().flatten() {
        let href = mark
            .get("attrs")
            .and_then(|attrs| attrs.get("href"))
            .and_then(Value::as_str);
        text = match mark.get("type").and_then(Value::as_str).unwrap_or_default() {
            "strong" => format!("**{text}**"),
            "em" => format!("*{text}*"),
            "code" => format!("`{text}`"),
            "strike" => format!("~~{text}~~"),
            "link" => match href {
                Some(href) => format!("[{text}]({href})"),
                None => text,
            },
            _ => text,
        };
    }
    text
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    total: Option<usize>,
    #[serde(default)]
    is_last: Option<bool>,
    #[serde(default)]
    next_page_token: Option<String>,
    #[serde(default)]
    issues: Vec<IssueResponse>,
}

#[derive(Debug, Deserialize)]
struct IssueResponse {
    key: String,
    fields: IssueFields,
}

#[derive(Debug, Deserialize)]
struct IssueFields {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    description: Option<Value>,
    #[serde(default)]
    status: Option<NamedObj>,
    #[serde(default)]
    priority: Option<NamedObj>,
    #[serde(default)]
    assignee: Option<UserObj>,
    #[serde(default)]
    reporter: Option<UserObj>,
    #[serde(default)]
    created: Option<String>,
    #[serde(default)]
    updated: Option<String>,
    #[serde(default)]
    duedate: Option<String>,
    #[serde(default)]
    comment: Option<CommentContainer>,
    #[serde(flatten)]
    custom: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct NamedObj {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserObj {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommentContainer {
    #[serde(default)]
    comments: Vec<CommentObj>,
}

#[derive(Debug, Deserialize)]
struct CommentObj {
    author: Option<UserObj>,
    #[serde(default)]
    body: Value,
    created: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerInfoResponse {
    server_title: Option<String>,
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MyselfResponse {
    display_name: Option<String>,
    email_address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProjectInfo {
    key: String,
    name: Option<String>,
}

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{StatusCode, Url};
use serde::Deserialize;

use crate::config::ObsidianConfig;
use crate::logging;
use crate::metrics::Metrics;

#[derive(Debug, thiserror::Error)]
pub enum ObsidianError {
    #[error("obsidian request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("obsidian returned HTTP {status}: {body}")]
    Http { status: StatusCode, body: String },
    #[error("note {0} not found")]
    NotFound(String),
    #[error("invalid vault path '{0}'")]
    InvalidPath(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObsidianConnectionReport {
    pub connected: bool,
    pub authenticated: bool,
    pub api_version: Option<String>,
    pub folder: String,
    pub folder_exists: bool,
    pub error: Option<String>,
}

impl ObsidianConnectionReport {
    pub fn is_ok(&self) -> bool {
        self.connected && self.authenticated
    }
}

#[derive(Debug, Clone)]
pub struct ObsidianClient {
    pub base_url: String,
    api_key: String,
    http: Client,
    metrics: Arc<Metrics>,
}

impl ObsidianClient {
    pub fn new(base_url: String, api_key: String) -> Result<Self, ObsidianError> {
        Self::new_with_metrics(base_url, api_key, Arc::new(Metrics::new()))
    }

    pub fn new_with_metrics(
        base_url: String,
        api_key: String,
        metrics: Arc<Metrics>,
    ) -> Result<Self, ObsidianError> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        let parsed =
            Url::parse(&base_url).map_err(|_| ObsidianError::InvalidPath(base_url.clone()))?;
        // The plugin serves a self-signed certificate on its https port;
        // only a loopback host skips verification.
        let local = is_loopback(&parsed);
        if !local {
            logging::debug(format!("verifying TLS certificates for {}", base_url));
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .danger_accept_invalid_certs(local)
            .build()?;
        Ok(Self {
            base_url,
            api_key,
            http,
            metrics,
        })
    }

    pub fn from_config(config: &ObsidianConfig, metrics: Arc<Metrics>) -> Result<Self, ObsidianError> {
        Self::new_with_metrics(config.api_url.clone(), config.api_key.clone(), metrics)
    }

    /// URL of a vault entry. Each path segment is percent-encoded; a folder
    /// URL keeps its trailing slash.
    pub fn vault_url(&self, path: &str, folder: bool) -> Result<Url, ObsidianError> {
        let trimmed = path.trim_matches('/');
        if trimmed.split('/').any(|segment| segment == "..") {
            return Err(ObsidianError::InvalidPath(path.to_string()));
        }

        let mut url =
            Url::parse(&self.base_url).map_err(|_| ObsidianError::InvalidPath(path.to_string()))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ObsidianError::InvalidPath(path.to_string()))?;
            segments.pop_if_empty().push("vault");
            if !trimmed.is_empty() {
                segments.extend(trimmed.split('/'));
            }
            if folder {
                segments.push("");
            }
        }
        Ok(url)
    }

    fn send(&self, request: RequestBuilder) -> Result<Response, ObsidianError> {
        self.metrics.inc_obsidian_request();
        request
            .bearer_auth(&self.api_key)
            .send()
            .map_err(|err| {
                logging::debug(format!("obsidian transport error: {}", err));
                ObsidianError::Request(err)
            })
    }

    fn http_error(response: Response) -> ObsidianError {
        let status = response.status();
        let body = response.text().unwrap_or_default();
        ObsidianError::Http { status, body }
    }

    pub fn exists(&self, path: &str) -> Result<bool, ObsidianError> {
        let url = self.vault_url(path, false)?;
        let response = self.send(self.http.get(url).header("Accept", "text/markdown"))?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(Self::http_error(response)),
        }
    }

    pub fn read(&self, path: &str) -> Result<String, ObsidianError> {
        let url = self.vault_url(path, false)?;
        let response = self.send(self.http.get(url).header("Accept", "text/markdown"))?;
        match response.status() {
            StatusCode::OK => Ok(response.text()?),
            StatusCode::NOT_FOUND => Err(ObsidianError::NotFound(path.to_string())),
            _ => Err(Self::http_error(response)),
        }
    }

    /// Creates or fully replaces the note at `path`. Missing parent folders
    /// are created by the plugin.
    pub fn write(&self, path: &str, content: &str) -> Result<(), ObsidianError> {
        let url = self.vault_url(path, false)?;
        let response = self.send(
            self.http
                .put(url)
                .header("Content-Type", "text/markdown")
                .body(content.to_string()),
        )?;
        match response.status() {
            StatusCode::OK | StatusCode::CREATED | StatusCode::NO_CONTENT => {
                self.metrics.inc_note_written();
                logging::debug(format!("saved note {}", path));
                Ok(())
            }
            _ => Err(Self::http_error(response)),
        }
    }

    /// Markdown notes directly inside `folder`, as vault-relative paths.
    /// A folder that does not exist yet lists as empty.
    pub fn list(&self, folder: &str) -> Result<Vec<String>, ObsidianError> {
        let folder = folder.trim_matches('/');
        let url = self.vault_url(folder, true)?;
        let response = self.send(self.http.get(url).header("Accept", "application/json"))?;
        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => {
                logging::debug(format!("folder {} not found", folder));
                return Ok(Vec::new());
            }
            _ => return Err(Self::http_error(response)),
        }

        let payload: FolderListing = response.json()?;
        let mut notes: Vec<String> = payload
            .files
            .into_iter()
            .filter(|name| name.ends_with(".md") && !name.ends_with('/'))
            .map(|name| {
                if folder.is_empty() {
                    name
                } else {
                    format!("{}/{}", folder, name)
                }
            })
            .collect();
        notes.sort();
        Ok(notes)
    }

    /// Never fails: unreachable servers and rejected keys are reported in
    /// the returned value.
    pub fn check_connection(&self, folder: &str) -> ObsidianConnectionReport {
        let mut report = ObsidianConnectionReport {
            connected: false,
            authenticated: false,
            api_version: None,
            folder: folder.to_string(),
            folder_exists: false,
            error: None,
        };

        let url = format!("{}/", self.base_url);
        let response = match self.send(self.http.get(url)) {
            Ok(response) => response,
            Err(err) => {
                report.error = Some(format!(
                    "cannot connect to the Obsidian Local REST API ({}); is the plugin enabled?",
                    err
                ));
                return report;
            }
        };
        report.connected = true;

        if !response.status().is_success() {
            report.error = Some(format!("unexpected status code {}", response.status()));
            return report;
        }

        match response.json::<ServerStatus>() {
            Ok(status) => {
                report.authenticated = status.authenticated;
                report.api_version = status.versions.and_then(|v| v.plugin);
                if !status.authenticated {
                    report.error = Some("invalid API key".to_string());
                    return report;
                }
            }
            Err(err) => {
                report.error = Some(format!("unexpected status payload: {}", err));
                return report;
            }
        }

        match self.vault_url(folder, true) {
            Ok(folder_url) => match self.send(self.http.get(folder_url)) {
                Ok(resp) => report.folder_exists = resp.status() == StatusCode::OK,
                Err(err) => report.error = Some(err.to_string()),
            },
            Err(err) => report.error = Some(err.to_string()),
        }

        report
    }
}

#[derive(Debug, Deserialize)]
struct FolderListing {
    #[serde(default)]
    files: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ServerStatus {
    #[serde(default)]
    authenticated: bool,
    #[serde(default)]
    versions: Option<Versions>,
}

fn is_loopback(url: &Url) -> bool {
    match url.host_str() {
        Some(host) if host.eq_ignore_ascii_case("localhost") => true,
        Some(host) => host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .map(|ip| ip.is_loopback())
            .unwrap_or(false),
        None => false,
    }
}

#[derive(Debug, Deserialize)]
struct Versions {
    #[serde(rename = "self")]
    plugin: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::{GET, PUT};
    use httpmock::MockServer;
    use serde_json::json;

    fn client(server: &MockServer) -> ObsidianClient {
        ObsidianClient::new(server.base_url(), "secret".into()).expect("client")
    }

    #[test]
    fn exists_maps_status_codes() {
        let server = MockServer::start();
        let _present = server.mock(|when, then| {
            when.method(GET)
                .path("/vault/JIRA/PROJ/PROJ-1.md")
                .header("Authorization", "Bearer secret");
            then.status(200).body("# PROJ-1");
        });
        let _absent = server.mock(|when, then| {
            when.method(GET).path("/vault/JIRA/PROJ/PROJ-2.md");
            then.status(404).json_body(json!({"errorCode": 40400}));
        });
        let _broken = server.mock(|when, then| {
            when.method(GET).path("/vault/JIRA/PROJ/PROJ-3.md");
            then.status(500).body("boom");
        });

        let client = client(&server);
        assert!(client.exists("JIRA/PROJ/PROJ-1.md").expect("exists"));
        assert!(!client.exists("JIRA/PROJ/PROJ-2.md").expect("exists"));
        let err = client
            .exists("JIRA/PROJ/PROJ-3.md")
            .expect_err("server error should surface");
        assert!(matches!(err, ObsidianError::Http { status, .. } if status.as_u16() == 500));
    }

    #[test]
    fn write_puts_markdown_body() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(PUT)
                .path("/vault/JIRA/PROJ/PROJ-1.md")
                .header("Authorization", "Bearer secret")
                .header("Content-Type", "text/markdown")
                .body("# hello\n");
            then.status(204);
        });

        let metrics = Arc::new(Metrics::new());
        let client =
            ObsidianClient::new_with_metrics(server.base_url(), "secret".into(), Arc::clone(&metrics))
                .expect("client");
        client
            .write("JIRA/PROJ/PROJ-1.md", "# hello\n")
            .expect("write should succeed");

        mock.assert();
        assert_eq!(metrics.snapshot(), (0, 1, 1));
    }

    #[test]
    fn write_reports_rejections() {
        let server = MockServer::start();
        let _mock = server.mock(|when, then| {
            when.method(PUT).path("/vault/JIRA/PROJ/PROJ-1.md");
            then.status(401).body("unauthorized");
        });

        let err = client(&server)
            .write("JIRA/PROJ/PROJ-1.md", "x")
            .expect_err("write should fail");
        assert!(matches!(err, ObsidianError::Http { status, .. } if status.as_u16() == 401));
    }

    #[test]
    fn read_returns_content_or_not_found() {
        let server = MockServer::start();
        let _note = server.mock(|when, then| {
            when.method(GET).path("/vault/JIRA/PROJ/PROJ-1.md");
            then.status(200).body("---\nkey: PROJ-1\n---\n");
        });
        let _missing = server.mock(|when, then| {
            when.method(GET).path("/vault/JIRA/PROJ/PROJ-9.md");
            then.status(404);
        });

        let client = client(&server);
        assert_eq!(
            client.read("JIRA/PROJ/PROJ-1.md").expect("read"),
            "---\nkey: PROJ-1\n---\n"
        );
        assert!(matches!(
            client.read("JIRA/PROJ/PROJ-9.md"),
            Err(ObsidianError::NotFound(_))
        ));
    }

    #[test]
    fn lists_markdown_notes_in_folder() {
        let server = MockServer::start();
        let _listing = server.mock(|when, then| {
            when.method(GET).path("/vault/JIRA/PROJ/");
            then.status(200).json_body(json!({
                "files": ["PROJ-2.md", "attachments/", "PROJ-10.md", "image.png"]
            }));
        });
        let _missing = server.mock(|when, then| {
            when.method(GET).path("/vault/JIRA/OPS/");
            then.status(404);
        });

        let client = client(&server);
        assert_eq!(
            client.list("JIRA/PROJ").expect("list"),
            vec!["JIRA/PROJ/PROJ-10.md".to_string(), "JIRA/PROJ/PROJ-2.md".to_string()]
        );
        assert!(client.list("/JIRA/OPS/").expect("list").is_empty());
    }

    #[test]
    fn rejects_parent_directory_segments() {
        let client = ObsidianClient::new("http://localhost:27123".into(), "k".into()).expect("client");
        assert!(matches!(
            client.vault_url("JIRA/../secrets.md", false),
            Err(ObsidianError::InvalidPath(_))
        ));
        assert_eq!(
            client.vault_url("JIRA", true).expect("url").as_str(),
            "http://localhost:27123/vault/JIRA/"
        );
        assert_eq!(
            client
                .vault_url("/My Vault/PROJ/PROJ-1.md", false)
                .expect("url")
                .as_str(),
            "http://localhost:27123/vault/My%20Vault/PROJ/PROJ-1.md"
        );
    }

    #[test]
    fn connection_check_reports_authentication_and_folder() {
        let server = MockServer::start();
        let _root = server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(200).json_body(json!({
                "status": "OK",
                "authenticated": true,
                "service": "Obsidian Local REST API",
                "versions": {"obsidian": "1.5.0", "self": "3.0.1"}
            }));
        });
        let _folder = server.mock(|when, then| {
            when.method(GET).path("/vault/JIRA/");
            then.status(200).json_body(json!({"files": []}));
        });

        let report = client(&server).check_connection("JIRA");
        assert!(report.is_ok());
        assert_eq!(report.api_version.as_deref(), Some("3.0.1"));
        assert!(report.folder_exists);
        assert_eq!(report.error, None);
    }

    #[test]
    fn connection_check_flags_bad_api_key() {
        let server = MockServer::start();
        let _root = server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(200)
                .json_body(json!({"status": "OK", "authenticated": false}));
        });

        let report = client(&server).check_connection("JIRA");
        assert!(report.connected);
        assert!(!report.authenticated);
        assert!(!report.is_ok());
        assert_eq!(report.error.as_deref(), Some("invalid API key"));
    }

    #[test]
    fn connection_check_reports_unreachable_server() {
        let client = ObsidianClient::new("http://127.0.0.1:9".into(), "k".into()).expect("client");
        let report = client.check_connection("JIRA");
        assert!(!report.connected);
        assert!(report.error.is_some());
    }

    #[test]
    fn only_loopback_hosts_skip_certificate_checks() {
        let local = |raw: &str| is_loopback(&Url::parse(raw).expect("url"));
        assert!(local("https://localhost:27124"));
        assert!(local("https://127.0.0.1:27124"));
        assert!(local("https://[::1]:27124"));
        assert!(!local("https://vault.example.com:27124"));
        assert!(!local("https://192.168.1.20:27124"));
    }
}

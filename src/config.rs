use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::ticket::is_valid_project_key;

#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub jira: JiraConfig,
    #[serde(default)]
    pub obsidian: ObsidianConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
pub struct JiraConfig {
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub api_token: String,
    #[serde(default)]
    pub projects: Vec<String>,
    #[serde(default = "default_excluded_statuses")]
    pub excluded_statuses: Vec<String>,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default)]
    pub fields: FieldMapping,
}

impl Default for JiraConfig {
    fn default() -> Self {
        Self {
            server: String::new(),
            email: String::new(),
            api_token: String::new(),
            projects: Vec::new(),
            excluded_statuses: default_excluded_statuses(),
            max_results: default_max_results(),
            fields: FieldMapping::default(),
        }
    }
}

/// Custom field ids differ between Jira instances.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldMapping {
    #[serde(default = "default_story_points_field")]
    pub story_points: String,
    #[serde(default = "default_sprint_field")]
    pub sprint: String,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            story_points: default_story_points_field(),
            sprint: default_sprint_field(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ObsidianConfig {
    #[serde(default = "default_obsidian_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_folder")]
    pub folder: String,
    #[serde(default = "default_update_existing")]
    pub update_existing: bool,
}

impl Default for ObsidianConfig {
    fn default() -> Self {
        Self {
            api_url: default_obsidian_api_url(),
            api_key: String::new(),
            folder: default_folder(),
            update_existing: default_update_existing(),
        }
    }
}

impl ObsidianConfig {
    /// Vault folder without leading or trailing slashes.
    pub fn note_folder(&self) -> &str {
        self.folder.trim().trim_matches('/')
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub debug: bool,
}

#[derive(Debug, Default)]
pub struct AppConfigOverrides {
    pub jira_server: Option<String>,
    pub jira_email: Option<String>,
    pub jira_api_token: Option<String>,
    pub jira_projects: Option<Vec<String>>,
    pub jira_max_results: Option<usize>,
    pub story_points_field: Option<String>,
    pub sprint_field: Option<String>,
    pub obsidian_api_url: Option<String>,
    pub obsidian_api_key: Option<String>,
    pub obsidian_folder: Option<String>,
    pub update_existing: Option<bool>,
    pub logging_debug: Option<bool>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found at {path}")]
    MissingConfigFile { path: PathBuf },
    #[error("failed to resolve config path: HOME is not set and XDG_CONFIG_HOME is unset")]
    MissingHomeDirectory,
    #[error("failed to read config file at {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse TOML config at {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Loads `.env`, the config file (explicit path, or the default location
/// when it exists), then applies environment overrides and validates.
pub fn load(explicit_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let _ = dotenvy::dotenv();

    let mut cfg = match explicit_path {
        Some(path) => read_file(path)?,
        None => match resolve_config_path() {
            Ok(path) if path.exists() => read_file(&path)?,
            _ => AppConfig::default(),
        },
    };

    let overrides = AppConfigOverrides::from_lookup(|name| std::env::var(name).ok())?;
    cfg.apply_overrides(&overrides)?;
    Ok(cfg)
}

fn read_file(path: &Path) -> Result<AppConfig, ConfigError> {
    let path = path.to_path_buf();
    let raw = std::fs::read_to_string(&path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ConfigError::MissingConfigFile { path: path.clone() }
        } else {
            ConfigError::ReadFailed {
                path: path.clone(),
                source,
            }
        }
    })?;

    toml::from_str::<AppConfig>(&raw).map_err(|source| ConfigError::ParseFailed {
        path: path.clone(),
        source,
    })
}

pub fn resolve_config_path() -> Result<PathBuf, ConfigError> {
    let xdg_config_home = std::env::var_os("XDG_CONFIG_HOME");
    let home = std::env::var_os("HOME");
    resolve_config_path_from_env(xdg_config_home, home)
}

fn resolve_config_path_from_env(
    xdg_config_home: Option<OsString>,
    home: Option<OsString>,
) -> Result<PathBuf, ConfigError> {
    if let Some(dir) = xdg_config_home.filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(dir)
            .join("jira-obsidian-sync")
            .join("config.toml"));
    }

    let home = home
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::MissingHomeDirectory)?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("jira-obsidian-sync")
        .join("config.toml"))
}

impl AppConfigOverrides {
    /// Reads overrides through `lookup`, which is `std::env::var` outside
    /// of tests. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let jira_max_results = match get("JIRA_MAX_RESULTS") {
            Some(raw) => Some(raw.parse::<usize>().map_err(|_| {
                ConfigError::Invalid(format!("JIRA_MAX_RESULTS must be a number, got '{raw}'"))
            })?),
            None => None,
        };

        let update_existing = match get("UPDATE_EXISTING_NOTES") {
            Some(raw) => Some(parse_bool("UPDATE_EXISTING_NOTES", &raw)?),
            None => None,
        };

        let logging_debug = match get("JIRA_OBSIDIAN_DEBUG") {
            Some(raw) => Some(parse_bool("JIRA_OBSIDIAN_DEBUG", &raw)?),
            None => None,
        };

        Ok(Self {
            jira_server: get("JIRA_SERVER"),
            jira_email: get("JIRA_EMAIL"),
            jira_api_token: get("JIRA_API_TOKEN"),
            jira_projects: get("JIRA_PROJECTS").map(|raw| parse_projects(&raw)),
            jira_max_results,
            story_points_field: get("JIRA_STORY_POINTS_FIELD"),
            sprint_field: get("JIRA_SPRINT_FIELD"),
            obsidian_api_url: get("OBSIDIAN_API_URL"),
            obsidian_api_key: get("OBSIDIAN_API_KEY"),
            obsidian_folder: get("OBSIDIAN_FOLDER"),
            update_existing,
            logging_debug,
        })
    }
}

fn parse_projects(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn parse_bool(name: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::Invalid(format!(
            "{name} must be true or false, got '{raw}'"
        ))),
    }
}

impl AppConfig {
    pub fn apply_overrides(&mut self, overrides: &AppConfigOverrides) -> Result<(), ConfigError> {
        if let Some(value) = &overrides.jira_server {
            self.jira.server = value.clone();
        }
        if let Some(value) = &overrides.jira_email {
            self.jira.email = value.clone();
        }
        if let Some(value) = &overrides.jira_api_token {
            self.jira.api_token = value.clone();
        }
        if let Some(value) = &overrides.jira_projects {
            self.jira.projects = value.clone();
        }
        if let Some(value) = overrides.jira_max_results {
            self.jira.max_results = value;
        }
        if let Some(value) = &overrides.story_points_field {
            self.jira.fields.story_points = value.clone();
        }
        if let Some(value) = &overrides.sprint_field {
            self.jira.fields.sprint = value.clone();
        }
        if let Some(value) = &overrides.obsidian_api_url {
            self.obsidian.api_url = value.clone();
        }
        if let Some(value) = &overrides.obsidian_api_key {
            self.obsidian.api_key = value.clone();
        }
        if let Some(value) = &overrides.obsidian_folder {
            self.obsidian.folder = value.clone();
        }
        if let Some(value) = overrides.update_existing {
            self.obsidian.update_existing = value;
        }
        if let Some(value) = overrides.logging_debug {
            self.logging.debug = value;
        }

        self.validate()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.jira.server.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "jira.server (JIRA_SERVER) must not be empty".into(),
            ));
        }
        if self.jira.email.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "jira.email (JIRA_EMAIL) must not be empty".into(),
            ));
        }
        if self.jira.api_token.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "jira.api_token (JIRA_API_TOKEN) must not be empty".into(),
            ));
        }
        if self.jira.projects.is_empty() {
            return Err(ConfigError::Invalid(
                "jira.projects (JIRA_PROJECTS) must contain at least one project key".into(),
            ));
        }
        for project in &self.jira.projects {
            if !is_valid_project_key(project) {
                return Err(ConfigError::Invalid(format!(
                    "jira.projects contains invalid project key '{project}'"
                )));
            }
        }
        if self.jira.max_results == 0 {
            return Err(ConfigError::Invalid("jira.max_results must be > 0".into()));
        }
        if self.jira.fields.story_points.trim().is_empty()
            || self.jira.fields.sprint.trim().is_empty()
        {
            return Err(ConfigError::Invalid(
                "jira.fields entries must not be empty".into(),
            ));
        }
        if reqwest::Url::parse(self.obsidian.api_url.trim()).is_err() {
            return Err(ConfigError::Invalid(format!(
                "obsidian.api_url (OBSIDIAN_API_URL) is not a valid URL: '{}'",
                self.obsidian.api_url
            )));
        }
        if self.obsidian.api_key.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "obsidian.api_key (OBSIDIAN_API_KEY) must not be empty".into(),
            ));
        }
        if self.obsidian.note_folder().is_empty() {
            return Err(ConfigError::Invalid(
                "obsidian.folder (OBSIDIAN_FOLDER) must not be empty".into(),
            ));
        }

        Ok(())
    }
}

fn default_excluded_statuses() -> Vec<String> {
    vec!["Done".into(), "Resolved".into(), "Closed".into()]
}

const fn default_max_results() -> usize {
    100
}

fn default_story_points_field() -> String {
    "customfield_10016".into()
}

fn default_sprint_field() -> String {
    "customfield_10020".into()
}

fn default_obsidian_api_url() -> String {
    "http://localhost:27123".into()
}

fn default_folder() -> String {
    "JIRA".into()
}

const fn default_update_existing() -> bool {
    true
}

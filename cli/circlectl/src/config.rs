//! Configuration resolution.
//!
//! Handles:
//! - The `[circleci]` section of the config file
//! - Environment overrides for the token and base URL
//! - First-run prompting and persistence of the token and default username

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

/// Default CircleCI API endpoint.
pub const DEFAULT_BASEURL: &str = "https://circleci.com/api/v1.1";

/// Config file name, relative to the home directory.
const CONFIG_FILE: &str = ".circlectl.toml";

/// Section of the config file owned by this CLI.
const SECTION: &str = "circleci";

pub const TOKEN_ENV: &str = "CIRCLE_TOKEN";
pub const BASEURL_ENV: &str = "CIRCLE_BASEURL";
pub const STATUS_URL_ENV: &str = "CIRCLE_STATUS_URL";
pub const CONFIG_PATH_ENV: &str = "CIRCLECTL_CONFIG";

/// Get the default config file path.
pub fn default_config_path() -> Result<PathBuf> {
    BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(CONFIG_FILE))
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))
}

/// Settings as stored on disk. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseurl: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_username: Option<String>,
}

/// Fully resolved configuration for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub token: String,
    pub baseurl: String,
    pub default_username: Option<String>,
}

impl Configuration {
    /// Every key as a `key=value` pair, in a stable order.
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("token", self.token.clone()),
            ("baseurl", self.baseurl.clone()),
            (
                "default_username",
                self.default_username.clone().unwrap_or_default(),
            ),
        ]
    }
}

/// Environment overrides, captured once at startup.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub token: Option<String>,
    pub baseurl: Option<String>,
    pub status_url: Option<String>,
    pub config_path: Option<PathBuf>,
}

impl EnvOverrides {
    /// Read overrides from the process environment.
    pub fn from_process() -> Self {
        let var = |name: &str| std::env::var(name).ok().and_then(non_blank);
        Self {
            token: var(TOKEN_ENV),
            baseurl: var(BASEURL_ENV),
            status_url: var(STATUS_URL_ENV),
            config_path: var(CONFIG_PATH_ENV).map(PathBuf::from),
        }
    }
}

/// Where settings are loaded from and persisted to.
pub trait SettingsStore {
    fn load(&self) -> Result<Settings>;
    fn save(&self, settings: &Settings) -> Result<()>;
}

/// Interactive input.
pub trait Prompt {
    /// Ask a question and return the answer with surrounding whitespace removed.
    fn ask(&mut self, question: &str) -> Result<String>;
}

/// TOML file store. Only the `[circleci]` section is read or rewritten.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<toml::Table> {
        if !self.path.exists() {
            return Ok(toml::Table::new());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read config from {:?}", self.path))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {:?}", self.path))
    }
}

impl SettingsStore for FileStore {
    fn load(&self) -> Result<Settings> {
        let mut document = self.read_document()?;
        let Some(section) = document.remove(SECTION) else {
            tracing::debug!(path = %self.path.display(), "No [circleci] section in config");
            return Ok(Settings::default());
        };

        section
            .try_into::<Settings>()
            .with_context(|| format!("Invalid [{SECTION}] section in {:?}", self.path))
    }

    fn save(&self, settings: &Settings) -> Result<()> {
        let mut document = self.read_document()?;
        let section = toml::Value::try_from(settings).context("Failed to encode settings")?;
        document.insert(SECTION.to_string(), section);
        let contents = toml::to_string(&document).context("Failed to encode config")?;

        if let Some(dir) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {:?}", dir))?;
        }

        // The token is a secret: keep the file private on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;

            let mut file = fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(&self.path)
                .with_context(|| format!("Failed to write config to {:?}", self.path))?;
            file.write_all(contents.as_bytes())?;
        }

        #[cfg(not(unix))]
        {
            fs::write(&self.path, contents)
                .with_context(|| format!("Failed to write config to {:?}", self.path))?;
        }

        tracing::debug!(path = %self.path.display(), "Saved config");
        Ok(())
    }
}

/// Prompt on the controlling terminal (stderr for the question, stdin for the answer).
#[derive(Debug, Default)]
pub struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn ask(&mut self, question: &str) -> Result<String> {
        let mut stderr = io::stderr();
        write!(stderr, "{question}: ")?;
        stderr.flush()?;

        let mut answer = String::new();
        io::stdin()
            .lock()
            .read_line(&mut answer)
            .context("Failed to read from stdin")?;
        Ok(answer.trim().to_string())
    }
}

/// Resolve the configuration for this run.
///
/// Precedence is environment over file over default. When no token can be
/// found the user is prompted for one (and for a default username if none is
/// on file), and the result is written back to the store.
pub fn resolve(
    store: &dyn SettingsStore,
    env: &EnvOverrides,
    prompt: &mut dyn Prompt,
) -> Result<Configuration> {
    let settings = store.load()?;

    let on_disk_token = settings.token.and_then(non_blank);
    let token = env.token.clone().or(on_disk_token);
    let baseurl = env
        .baseurl
        .clone()
        .or_else(|| settings.baseurl.and_then(non_blank))
        .unwrap_or_else(|| DEFAULT_BASEURL.to_string());
    let mut default_username = settings.default_username.and_then(non_blank);

    let token = match token {
        Some(token) => token,
        None => {
            tracing::debug!("No API token configured, prompting");
            let token = prompt.ask("CircleCI API token")?;
            if token.is_empty() {
                anyhow::bail!("An API token is required");
            }

            if default_username.is_none() {
                default_username = non_blank(prompt.ask("Default username (optional)")?);
            }

            store.save(&Settings {
                token: Some(token.clone()),
                baseurl: Some(baseurl.clone()),
                default_username: default_username.clone(),
            })?;

            token
        }
    };

    Ok(Configuration {
        token,
        baseurl,
        default_username,
    })
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

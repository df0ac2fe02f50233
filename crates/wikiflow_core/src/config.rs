use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ActionError;
use crate::version::Version;

pub const DEFAULT_USER_AGENT: &str = "wikiflow/0.2";
pub const DEFAULT_CONFIG_FILENAME: &str = "wikiflow.toml";

/// On-disk configuration (`wikiflow.toml`).
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct FileConfig {
    #[serde(default)]
    pub wiki: WikiSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiSection {
    pub api_url: Option<String>,
    pub user_agent: Option<String>,
    /// Pins the dialect instead of negotiating it, e.g. `"1.27"`.
    pub version: Option<Version>,
}

/// Load and parse a FileConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<FileConfig> {
    if !config_path.exists() {
        return Ok(FileConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: FileConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_url: String,
    pub user_agent: String,
    pub timeout_ms: u64,
    pub rate_limit_read_ms: u64,
    pub rate_limit_write_ms: u64,
    pub max_retries: usize,
    pub max_write_retries: usize,
    pub retry_delay_ms: u64,
    pub version: Option<Version>,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ActionError> {
        Self::from_file_config(&FileConfig::default())
    }

    /// Resolve every key: env > config file > default.
    pub fn from_file_config(config: &FileConfig) -> Result<Self, ActionError> {
        Self::from_file_config_with(config, process_env)
    }

    pub fn from_file_config_with(
        config: &FileConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ActionError> {
        let lookup = EnvLookup(env);
        let version = match lookup.string("WIKI_VERSION") {
            Some(value) => Some(value.parse::<Version>()?),
            None => config.wiki.version,
        };
        let resolved = Self {
            api_url: lookup.value("WIKI_API_URL", config.wiki.api_url.as_deref().unwrap_or("")),
            user_agent: lookup.value(
                "WIKI_USER_AGENT",
                config
                    .wiki
                    .user_agent
                    .as_deref()
                    .unwrap_or(DEFAULT_USER_AGENT),
            ),
            timeout_ms: lookup.parsed("WIKI_HTTP_TIMEOUT_MS", 30_000),
            rate_limit_read_ms: lookup.parsed("WIKI_RATE_LIMIT_READ", 300),
            rate_limit_write_ms: lookup.parsed("WIKI_RATE_LIMIT_WRITE", 1_000),
            max_retries: lookup.parsed("WIKI_HTTP_RETRIES", 2),
            max_write_retries: lookup.parsed("WIKI_HTTP_WRITE_RETRIES", 1),
            retry_delay_ms: lookup.parsed("WIKI_HTTP_RETRY_DELAY_MS", 500),
            version,
        };
        resolved.validate()?;
        Ok(resolved)
    }

    /// Defaults for a given endpoint, ignoring the environment.
    pub fn for_url(api_url: &str) -> Result<Self, ActionError> {
        let config = FileConfig {
            wiki: WikiSection {
                api_url: Some(api_url.trim().to_string()),
                ..WikiSection::default()
            },
        };
        Self::from_file_config_with(&config, |_| None)
    }

    pub fn validate(&self) -> Result<(), ActionError> {
        if self.api_url.is_empty() {
            return Err(ActionError::precondition(
                "WIKI_API_URL is not set (env or [wiki].api_url)",
            ));
        }
        if !(self.api_url.ends_with(".php") || self.api_url.ends_with('/')) {
            return Err(ActionError::precondition(format!(
                "({}) url must end with slash or .php",
                self.api_url
            )));
        }
        Ok(())
    }
}

/// Credentials for write commands, read from `WIKI_USERNAME`/`WIKI_PASSWORD`.
pub fn credentials_from_env() -> Option<(String, String)> {
    let username = EnvLookup(process_env).string("WIKI_USERNAME")?;
    let password = env::var("WIKI_PASSWORD").ok()?;
    Some((username, password))
}

fn process_env(key: &str) -> Option<String> {
    env::var(key).ok()
}

struct EnvLookup<F>(F);

impl<F: Fn(&str) -> Option<String>> EnvLookup<F> {
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn value(&self, key: &str, default: &str) -> String {
        self.string(key).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T: FromStr>(&self, key: &str, default: T) -> T {
        self.string(key)
            .and_then(|value| value.parse::<T>().ok())
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::{ClientConfig, DEFAULT_USER_AGENT, FileConfig, WikiSection, load_config};
    use crate::error::ActionError;
    use crate::version::Version;

    #[test]
    fn missing_file_yields_default() {
        let temp = tempdir().expect("tempdir");
        let config = load_config(&temp.path().join("wikiflow.toml")).expect("load");
        assert_eq!(config, FileConfig::default());
    }

    #[test]
    fn parses_wiki_section() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("wikiflow.toml");
        fs::write(
            &path,
            "[wiki]\napi_url = \"https://wiki.example.org/w/api.php\"\nversion = \"1.27\"\n",
        )
        .expect("write config");
        let config = load_config(&path).expect("load");
        assert_eq!(
            config.wiki.api_url.as_deref(),
            Some("https://wiki.example.org/w/api.php")
        );
        assert_eq!(config.wiki.version, Some(Version::Mw1_27));
    }

    #[test]
    fn malformed_file_is_reported() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("wikiflow.toml");
        fs::write(&path, "[wiki\n").expect("write config");
        let error = load_config(&path).expect_err("malformed");
        assert!(error.to_string().contains("failed to parse"));
    }

    #[test]
    fn url_must_end_with_slash_or_php() {
        ClientConfig::for_url("https://wiki.example.org/w/api.php").expect("php");
        ClientConfig::for_url("https://wiki.example.org/w/").expect("slash");
        let error = ClientConfig::for_url("https://wiki.example.org/w").expect_err("bad url");
        assert!(matches!(error, ActionError::Precondition(_)));
    }

    #[test]
    fn unknown_pinned_version_is_rejected() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("wikiflow.toml");
        fs::write(&path, "[wiki]\nversion = \"0.9\"\n").expect("write config");
        let error = load_config(&path).expect_err("unknown version");
        assert!(error.to_string().contains("failed to parse"));

        let config = file_config(None);
        let error = ClientConfig::from_file_config_with(&config, |key| {
            (key == "WIKI_VERSION").then(|| "0.9".to_string())
        })
        .expect_err("unknown env version");
        assert!(matches!(error, ActionError::Precondition(_)));
    }

    #[test]
    fn env_overrides_file_which_overrides_defaults() {
        let config = file_config(Some(Version::Mw1_23));
        let resolved = ClientConfig::from_file_config_with(&config, |key| match key {
            "WIKI_VERSION" => Some("1.27".to_string()),
            "WIKI_HTTP_RETRIES" => Some(" 5 ".to_string()),
            "WIKI_RATE_LIMIT_READ" => Some("not a number".to_string()),
            "WIKI_USER_AGENT" => Some("   ".to_string()),
            _ => None,
        })
        .expect("resolve");
        assert_eq!(resolved.version, Some(Version::Mw1_27));
        assert_eq!(resolved.max_retries, 5);
        assert_eq!(resolved.rate_limit_read_ms, 300);
        assert_eq!(resolved.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(resolved.api_url, "https://wiki.example.org/w/api.php");

        let pinned = ClientConfig::from_file_config_with(&config, |_| None).expect("resolve");
        assert_eq!(pinned.version, Some(Version::Mw1_23));
    }

    fn file_config(version: Option<Version>) -> FileConfig {
        FileConfig {
            wiki: WikiSection {
                api_url: Some("https://wiki.example.org/w/api.php".to_string()),
                user_agent: None,
                version,
            },
        }
    }
}

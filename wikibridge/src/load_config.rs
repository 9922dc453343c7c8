/// `load_config` module: reads the static YAML description of a multi-source sync
/// and injects secrets from the environment.
///
/// The YAML never carries credentials. Source and target secrets are read from
/// `CONFLUENCE_USER`, `CONFLUENCE_PASSWORD`, `GITHUB_TOKEN`, `XWIKI_ADMIN_USER`
/// and `XWIKI_ADMIN_PASSWORD` at load time.
///
/// # Errors
/// All errors use `anyhow::Error` and surface at the CLI boundary.
use anyhow::Result;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info};
use wikibridge_core::config::{Hierarchy, SyncConfig, DEFAULT_PAGE_SIZE, DEFAULT_TIMEOUT};

/// One source to migrate from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceSection {
    Confluence {
        base_url: String,
        space_key: String,
        /// Target root namespace; defaults to `Confluence_<SPACE>`.
        #[serde(default)]
        namespace: Option<String>,
    },
    Github {
        user: String,
        /// Target root namespace; defaults to `GitHub`.
        #[serde(default)]
        namespace: Option<String>,
    },
}

impl SourceSection {
    pub fn container(&self) -> &str {
        match self {
            SourceSection::Confluence { space_key, .. } => space_key,
            SourceSection::Github { user, .. } => user,
        }
    }

    pub fn namespace_root(&self) -> String {
        match self {
            SourceSection::Confluence {
                space_key,
                namespace,
                ..
            } => namespace
                .clone()
                .unwrap_or_else(|| format!("Confluence_{space_key}")),
            SourceSection::Github { namespace, .. } => {
                namespace.clone().unwrap_or_else(|| "GitHub".to_string())
            }
        }
    }

    /// Run settings for this source under the shared target section.
    pub fn sync_config(&self, target: &TargetSection, dry_run: bool) -> SyncConfig {
        let mut config = SyncConfig::new(self.container(), self.namespace_root());
        config.hierarchy = target.hierarchy;
        config.page_size = target.page_size;
        config.timeout = target.timeout();
        config.dry_run = dry_run || target.dry_run;
        if let SourceSection::Confluence { space_key, .. } = self {
            config.banner = Some(format!("Confluence space **{space_key}**"));
        }
        config
    }
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TargetSection {
    pub base_url: String,
    /// Overrides `XWIKI_ADMIN_USER`.
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub hierarchy: Hierarchy,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub dry_run: bool,
}

impl TargetSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Credentials taken from the environment, never from the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Secrets {
    pub confluence_user: Option<String>,
    pub confluence_password: Option<String>,
    pub github_token: Option<String>,
    pub xwiki_user: Option<String>,
    pub xwiki_password: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        let var = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());
        Secrets {
            confluence_user: var("CONFLUENCE_USER"),
            confluence_password: var("CONFLUENCE_PASSWORD"),
            github_token: var("GITHUB_TOKEN"),
            xwiki_user: var("XWIKI_ADMIN_USER"),
            xwiki_password: var("XWIKI_ADMIN_PASSWORD"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub sources: Vec<SourceSection>,
    pub target: TargetSection,
    pub secrets: Secrets,
}

/// Loads a static YAML config file (no secrets) and injects secrets from the environment.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!("Failed to read config file {:?}: {}", path_ref, e));
        }
    };

    #[derive(Debug, Deserialize)]
    struct RawConfig {
        #[serde(default)]
        sources: Vec<SourceSection>,
        target: TargetSection,
    }

    let raw: RawConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };
    if raw.target.page_size == 0 {
        return Err(anyhow::anyhow!("target.page_size must be at least 1"));
    }
    info!(sources = raw.sources.len(), target = %raw.target.base_url, "Loaded CliConfig");

    Ok(CliConfig {
        sources: raw.sources,
        target: raw.target,
        secrets: Secrets::from_env(),
    })
}

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "Trellis.toml";

/// Contents of `Trellis.toml`. Every field has a default, so a missing
/// file is the same as an empty one.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TrellisConfig {
    pub server: ServerConfig,
    pub paths: PathsConfig,
    pub client: ClientConfig,
    pub dev: DevConfig,
    pub log_level: String,

    /// Directory relative paths resolve against.
    #[serde(skip)]
    pub root: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Larger request bodies get a 413.
    pub max_body_bytes: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PathsConfig {
    pub template: PathBuf,
    pub static_dir: PathBuf,
    pub client_dir: PathBuf,
    pub css_manifest_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ClientConfig {
    /// Module that boots the client runtime.
    pub entry: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct DevConfig {
    pub enabled: bool,
    /// Script srcs emitted first in the head while `enabled`.
    pub scripts: Vec<String>,
}

impl Default for TrellisConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            paths: PathsConfig::default(),
            client: ClientConfig::default(),
            dev: DevConfig::default(),
            log_level: "info".to_string(),
            root: PathBuf::from("."),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            template: PathBuf::from("src/app.html"),
            static_dir: PathBuf::from("static"),
            client_dir: PathBuf::from("__trellis__/client"),
            css_manifest_dir: PathBuf::from("__trellis__/server/css"),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            entry: "/__trellis__/client/trellis.js".to_string(),
        }
    }
}

impl TrellisConfig {
    pub fn load(project_root: &Path) -> Result<Self> {
        let config_path = project_root.join(CONFIG_FILE);

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::parse(&content).map_err(|message| Error::Config {
                path: config_path.clone(),
                message,
            })?
        } else {
            tracing::debug!(path = %config_path.display(), "no config file, using defaults");
            Self::default()
        };
        config.root = project_root.to_path_buf();
        Ok(config)
    }

    fn parse(content: &str) -> std::result::Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn template_path(&self) -> PathBuf {
        self.resolve(&self.paths.template)
    }

    pub fn static_dir(&self) -> PathBuf {
        self.resolve(&self.paths.static_dir)
    }

    pub fn client_dir(&self) -> PathBuf {
        self.resolve(&self.paths.client_dir)
    }

    pub fn css_manifest_dir(&self) -> PathBuf {
        self.resolve(&self.paths.css_manifest_dir)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Dev scripts to emit, empty unless dev mode is on.
    pub fn dev_scripts(&self) -> Vec<String> {
        if self.dev.enabled {
            self.dev.scripts.clone()
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrellisConfig::load(dir.path()).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.max_body_bytes, 2 * 1024 * 1024);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.client.entry, "/__trellis__/client/trellis.js");
        assert_eq!(config.template_path(), dir.path().join("src/app.html"));
        assert!(config.dev_scripts().is_empty());
    }

    #[test]
    fn partial_files_keep_the_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"
log_level = "debug"

[server]
port = 8080
max_body_bytes = 1024

[paths]
static_dir = "/var/www"

[dev]
enabled = true
scripts = ["/@vite/client"]
"#,
        )
        .unwrap();

        let config = TrellisConfig::load(dir.path()).unwrap();
        assert_eq!(config.address(), "127.0.0.1:8080");
        assert_eq!(config.server.max_body_bytes, 1024);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.static_dir(), PathBuf::from("/var/www"));
        assert_eq!(config.client_dir(), dir.path().join("__trellis__/client"));
        assert_eq!(config.dev_scripts(), vec!["/@vite/client".to_string()]);
    }

    #[test]
    fn invalid_files_name_their_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[server]\nport = \"x\"").unwrap();
        match TrellisConfig::load(dir.path()) {
            Err(Error::Config { path, .. }) => assert_eq!(path, dir.path().join(CONFIG_FILE)),
            other => panic!("expected a config error, got {other:?}"),
        }
    }
}

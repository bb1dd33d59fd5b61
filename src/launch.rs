//! Launch context handed to execution agents for every granted slot.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::LaunchConfig;
use crate::error::Result;

/// Token the agent expands to the container's log directory.
pub const LOG_DIR_EXPANSION: &str = "<LOG_DIR>";
pub const STDOUT_FILE: &str = "stdout";
pub const STDERR_FILE: &str = "stderr";

pub const SEARCH_PATH_ENV: &str = "CLASSPATH";
pub const LOCALE_ENV: &str = "LANG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocalResourceKind {
    File,
    Archive,
    Pattern,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocalResourceVisibility {
    Private,
    Application,
    Public,
}

/// A file the agent fetches into the container's working directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalResource {
    pub url: String,
    pub size: u64,
    pub timestamp: i64,
    pub kind: LocalResourceKind,
    pub visibility: LocalResourceVisibility,
}

impl LocalResource {
    /// A private file resource with unknown size and timestamp.
    pub fn file(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            size: 0,
            timestamp: 0,
            kind: LocalResourceKind::File,
            visibility: LocalResourceVisibility::Private,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchContext {
    pub commands: Vec<String>,
    pub environment: BTreeMap<String, String>,
    pub local_resources: BTreeMap<String, LocalResource>,
    pub tokens: Vec<u8>,
}

impl LaunchContext {
    /// Build the context from config, reading the tokens file if one is set.
    pub async fn load(config: &LaunchConfig) -> Result<Self> {
        let tokens = match &config.tokens_path {
            Some(path) => tokio::fs::read(path).await?,
            None => Vec::new(),
        };
        Ok(Self::from_config(config, tokens))
    }

    pub fn from_config(config: &LaunchConfig, tokens: Vec<u8>) -> Self {
        let mut environment = config.environment.clone();
        environment.insert(SEARCH_PATH_ENV.to_string(), search_path(&config.search_path));
        environment.insert(LOCALE_ENV.to_string(), config.locale.clone());

        Self {
            commands: vec![command_line(config)],
            environment,
            local_resources: config.local_resources.clone(),
            tokens,
        }
    }
}

/// `<program> [args...] [debug] 1><LOG_DIR>/stdout 2><LOG_DIR>/stderr`
pub fn command_line(config: &LaunchConfig) -> String {
    let mut parts = Vec::with_capacity(config.args.len() + 4);
    parts.push(config.program.clone());
    parts.extend(config.args.iter().cloned());
    if config.debug {
        parts.push("debug".to_string());
    }
    parts.push(format!("1>{}/{}", LOG_DIR_EXPANSION, STDOUT_FILE));
    parts.push(format!("2>{}/{}", LOG_DIR_EXPANSION, STDERR_FILE));
    parts.join(" ")
}

fn search_path(entries: &[String]) -> String {
    std::iter::once("./*")
        .chain(entries.iter().map(|e| e.trim()))
        .filter(|e| !e.is_empty())
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_redirects_into_log_dir() {
        let config = LaunchConfig {
            program: "ping".to_string(),
            args: vec!["-c100".to_string(), "example.com".to_string()],
            ..LaunchConfig::default()
        };
        assert_eq!(
            command_line(&config),
            "ping -c100 example.com 1><LOG_DIR>/stdout 2><LOG_DIR>/stderr"
        );
    }

    #[test]
    fn command_line_appends_debug_flag() {
        let config = LaunchConfig {
            program: "/opt/work/bin/unit".to_string(),
            args: Vec::new(),
            debug: true,
            ..LaunchConfig::default()
        };
        assert_eq!(
            command_line(&config),
            "/opt/work/bin/unit debug 1><LOG_DIR>/stdout 2><LOG_DIR>/stderr"
        );
    }

    #[test]
    fn environment_has_search_path_and_locale() {
        let mut config = LaunchConfig {
            search_path: vec![" /etc/conf ".to_string(), "/usr/lib/*".to_string()],
            ..LaunchConfig::default()
        };
        config
            .environment
            .insert("APP_MODE".to_string(), "batch".to_string());

        let ctx = LaunchContext::from_config(&config, Vec::new());
        assert_eq!(ctx.environment["CLASSPATH"], "./*:/etc/conf:/usr/lib/*");
        assert_eq!(ctx.environment["LANG"], "en_US.UTF-8");
        assert_eq!(ctx.environment["APP_MODE"], "batch");
        assert_eq!(ctx.commands.len(), 1);
    }

    #[test]
    fn tokens_pass_through_unchanged() {
        let tokens = vec![0u8, 1, 2, 255];
        let ctx = LaunchContext::from_config(&LaunchConfig::default(), tokens.clone());
        assert_eq!(ctx.tokens, tokens);
    }

    #[tokio::test]
    async fn load_reads_tokens_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.bin");
        std::fs::write(&path, b"opaque-credentials").unwrap();

        let config = LaunchConfig {
            tokens_path: Some(path),
            ..LaunchConfig::default()
        };
        let ctx = LaunchContext::load(&config).await.unwrap();
        assert_eq!(ctx.tokens, b"opaque-credentials".to_vec());
    }

    #[tokio::test]
    async fn load_fails_on_missing_tokens_file() {
        let config = LaunchConfig {
            tokens_path: Some("/nonexistent/tokens.bin".into()),
            ..LaunchConfig::default()
        };
        assert!(LaunchContext::load(&config).await.is_err());
    }
}

use std::path::{Path, PathBuf};

use anyhow::Context;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tm_auth::ProxyConfig;
use tracing::debug;
use url::Url;

use crate::cli::GlobalArgs;

const SETTINGS_FILE: &str = "tokenman.toml";
const DEFAULT_OUTPUT_DIR: &str = "data";

/// Optional `tokenman.toml` settings
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub output_dir: Option<PathBuf>,
    pub proxy: Option<String>,
    pub proxy_verify_tls: Option<bool>,
    pub page_limit: Option<usize>,
}

impl Settings {
    /// Load `path`, or the platform default location when `None`.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub async fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let (file_path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match default_settings_path() {
                Ok(path) => (path, false),
                Err(e) => {
                    debug!("No settings location: {}", e);
                    return Ok(Self::default());
                }
            },
        };

        let content = match tokio::fs::read(&file_path).await {
            Ok(content) => content,
            Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings file at {}", file_path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read settings '{}'", file_path.display()));
            }
        };

        let settings = toml::from_slice(&content)
            .with_context(|| format!("Failed to parse settings '{}'", file_path.display()))?;
        debug!("Loaded settings from {}", file_path.display());
        Ok(settings)
    }
}

fn default_settings_path() -> anyhow::Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("com", "tokenman", "tokenman")
        .context("Failed to get project directories")?;
    Ok(proj_dirs.config_dir().join(SETTINGS_FILE))
}

/// Settings after applying CLI flags over the settings file over defaults
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub output_dir: PathBuf,
    pub proxy: Option<ProxyConfig>,
    pub page_limit: usize,
}

pub fn resolve(args: &GlobalArgs, settings: &Settings) -> anyhow::Result<Resolved> {
    let output_dir = args
        .output
        .clone()
        .or_else(|| settings.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));

    let proxy_url = match (&args.proxy, &settings.proxy) {
        (Some(url), _) => Some(url.clone()),
        (None, Some(raw)) => {
            Some(Url::parse(raw).with_context(|| format!("Invalid proxy url '{raw}'"))?)
        }
        (None, None) => None,
    };
    let verify_tls = args.proxy_verify_tls || settings.proxy_verify_tls.unwrap_or(false);
    let proxy = proxy_url.map(|url| ProxyConfig::new(url).with_tls_verification(verify_tls));

    let page_limit = settings.page_limit.unwrap_or(tm_graph::DEFAULT_PAGE_LIMIT);

    Ok(Resolved {
        output_dir,
        proxy,
        page_limit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_settings_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tokenman.toml");
        std::fs::write(
            &path,
            "output_dir = \"loot\"\nproxy = \"http://127.0.0.1:8080\"\npage_limit = 5\n",
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).await.unwrap();
        assert_eq!(settings.output_dir, Some(PathBuf::from("loot")));
        assert_eq!(settings.page_limit, Some(5));
        assert_eq!(settings.proxy_verify_tls, None);
    }

    #[tokio::test]
    async fn test_explicit_missing_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = Settings::load(Some(&temp_dir.path().join("missing.toml"))).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_malformed_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tokenman.toml");
        std::fs::write(&path, "page_limit = \"many\"").unwrap();

        assert!(Settings::load(Some(&path)).await.is_err());
    }

    #[test]
    fn test_resolve_defaults() {
        let resolved = resolve(&GlobalArgs::default(), &Settings::default()).unwrap();
        assert_eq!(resolved.output_dir, PathBuf::from("data"));
        assert_eq!(resolved.proxy, None);
        assert_eq!(resolved.page_limit, 100);
    }

    #[test]
    fn test_flags_override_file() {
        let args = GlobalArgs {
            output: Some(PathBuf::from("out")),
            proxy: Some(Url::parse("http://10.0.0.1:3128").unwrap()),
            ..Default::default()
        };
        let settings = Settings {
            output_dir: Some(PathBuf::from("loot")),
            proxy: Some("http://127.0.0.1:8080".to_string()),
            proxy_verify_tls: Some(true),
            page_limit: Some(3),
        };

        let resolved = resolve(&args, &settings).unwrap();
        assert_eq!(resolved.output_dir, PathBuf::from("out"));
        assert_eq!(resolved.page_limit, 3);

        let proxy = resolved.proxy.unwrap();
        assert_eq!(proxy.https.as_str(), "http://10.0.0.1:3128/");
        assert!(proxy.verify_tls);
    }

    #[test]
    fn test_invalid_proxy_in_file() {
        let settings = Settings {
            proxy: Some("not a url".to_string()),
            ..Default::default()
        };
        assert!(resolve(&GlobalArgs::default(), &settings).is_err());
    }
}

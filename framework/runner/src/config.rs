use crate::cli::CrosswindScenarioCli;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid base URL `{url}`: {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Base URL `{0}` must use http or https")]
    UnsupportedScheme(String),
    #[error("The request timeout must be at least one second")]
    ZeroRequestTimeout,
    #[error("The iteration limit must be at least one")]
    ZeroIterations,
}

/// Run configuration, resolved once from the command line and environment and then shared,
/// read-only, with every hook.
#[derive(Debug, Clone)]
pub struct RunConfig {
    base_url: Url,
    username: Option<String>,
    password: Option<String>,
    out_dir: PathBuf,
    request_timeout: Duration,
    iterations: Option<u64>,
    no_progress: bool,
    run_id: Option<String>,
    run_summary_path: Option<PathBuf>,
}

impl RunConfig {
    pub fn from_cli(cli: &CrosswindScenarioCli) -> Result<Self, ConfigError> {
        let base_url = Url::parse(&cli.base_url).map_err(|source| ConfigError::InvalidBaseUrl {
            url: cli.base_url.clone(),
            source,
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ConfigError::UnsupportedScheme(cli.base_url.clone()));
        }
        if cli.request_timeout == 0 {
            return Err(ConfigError::ZeroRequestTimeout);
        }
        if cli.iterations == Some(0) {
            return Err(ConfigError::ZeroIterations);
        }

        Ok(Self {
            base_url,
            username: cli.username.clone().filter(|u| !u.is_empty()),
            password: cli.password.clone().filter(|p| !p.is_empty()),
            out_dir: cli.out_dir.clone(),
            request_timeout: Duration::from_secs(cli.request_timeout),
            iterations: cli.iterations,
            no_progress: cli.no_progress,
            run_id: cli.run_id.clone(),
            run_summary_path: cli.run_summary_path.clone(),
        })
    }

    /// The base URL without a trailing slash, ready for a path to be appended.
    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    /// Join `path` onto the base URL, for example `url("/healthz")`.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url(), path.trim_start_matches('/'))
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn iterations(&self) -> Option<u64> {
        self.iterations
    }

    pub fn no_progress(&self) -> bool {
        self.no_progress
    }

    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    pub fn run_summary_path(&self) -> Option<&Path> {
        self.run_summary_path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_paths_onto_base_url() {
        let cli = CrosswindScenarioCli {
            base_url: "http://localhost:4000/".to_string(),
            ..Default::default()
        };
        let config = RunConfig::from_cli(&cli).unwrap();

        assert_eq!("http://localhost:4000", config.base_url());
        assert_eq!("http://localhost:4000/healthz", config.url("/healthz"));
        assert_eq!("http://localhost:4000/healthz", config.url("healthz"));
    }

    #[test]
    fn keeps_base_path() {
        let cli = CrosswindScenarioCli {
            base_url: "https://example.com/api".to_string(),
            ..Default::default()
        };
        let config = RunConfig::from_cli(&cli).unwrap();
        assert_eq!("https://example.com/api/login", config.url("/login"));
    }

    #[test]
    fn rejects_bad_base_url() {
        let cli = CrosswindScenarioCli {
            base_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            RunConfig::from_cli(&cli),
            Err(ConfigError::InvalidBaseUrl { .. })
        ));

        let cli = CrosswindScenarioCli {
            base_url: "ftp://example.com".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            RunConfig::from_cli(&cli),
            Err(ConfigError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn empty_credentials_are_unset() {
        let cli = CrosswindScenarioCli {
            username: Some(String::new()),
            password: Some("secret".to_string()),
            ..Default::default()
        };
        let config = RunConfig::from_cli(&cli).unwrap();
        assert_eq!(None, config.username());
        assert_eq!(Some("secret"), config.password());
    }
}

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use url::Url;

use crate::credentials::Credentials;
use crate::engine::EngineSettings;
use crate::error::LoadError;
use crate::patterns::Portal;
use crate::runner::RunPlan;

#[derive(Parser, Debug)]
#[command(name = "portal-loadgen")]
#[command(about = "Simulated-user load test for Sakai portals", long_about = None)]
pub struct Config {
    /// Base URL of the portal under test
    pub base_url: Url,

    /// Number of concurrent simulated users
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    pub users: u32,

    /// File of `username password` lines; `#` starts a comment line
    #[arg(long, env = "CREDENTIALS_FILE", default_value = "users.txt")]
    pub credentials: PathBuf,

    /// Tools each user visits before returning to their workspace
    #[arg(long, env = "TOOL_VISITS", default_value = "50", value_parser = clap::value_parser!(u32).range(1..))]
    pub visits: u32,

    /// Tool titles to leave out (substring match)
    #[arg(
        long = "skip-tool",
        env = "SKIP_TOOLS",
        value_delimiter = ',',
        default_values = ["Gradebook", "NYU Libraries"]
    )]
    pub skip_tools: Vec<String>,

    /// Per-request timeout in seconds (0 disables)
    #[arg(long, env = "REQUEST_TIMEOUT", default_value = "60")]
    pub request_timeout: u64,

    /// Give up waiting for a user's outstanding requests after this many seconds
    #[arg(long, env = "DRAIN_TIMEOUT")]
    pub drain_timeout: Option<u64>,

    /// Accept invalid TLS certificates
    #[arg(long, env = "INSECURE")]
    pub insecure: bool,

    /// Also write the report as JSON to this path
    #[arg(long, env = "REPORT_JSON")]
    pub report_json: Option<PathBuf>,
}

impl Config {
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            request_timeout: (self.request_timeout > 0)
                .then(|| Duration::from_secs(self.request_timeout)),
            accept_invalid_certs: self.insecure,
        }
    }

    pub fn plan(&self, credentials: Vec<Credentials>) -> Result<RunPlan, LoadError> {
        Ok(RunPlan {
            base_url: self.base_url.clone(),
            users: self.users as usize,
            visits: self.visits,
            credentials,
            portal: Arc::new(Portal::sakai(self.skip_tools.clone())?),
            engine: self.engine_settings(),
            drain_timeout: self.drain_timeout.map(Duration::from_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["portal-loadgen", "https://lms.example.edu/", "3"]).unwrap();

        assert_eq!(config.users, 3);
        assert_eq!(config.visits, 50);
        assert_eq!(config.skip_tools, ["Gradebook", "NYU Libraries"]);
        assert_eq!(
            config.engine_settings().request_timeout,
            Some(Duration::from_secs(60))
        );
        assert!(config.drain_timeout.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = Config::try_parse_from([
            "portal-loadgen",
            "http://localhost:8080/",
            "10",
            "--visits",
            "5",
            "--skip-tool",
            "Roster",
            "--request-timeout",
            "0",
            "--drain-timeout",
            "30",
            "--insecure",
        ])
        .unwrap();

        assert_eq!(config.skip_tools, ["Roster"]);
        let settings = config.engine_settings();
        assert!(settings.request_timeout.is_none());
        assert!(settings.accept_invalid_certs);

        let plan = config
            .plan(vec![Credentials {
                username: "alice".to_string(),
                password: "p1".to_string(),
            }])
            .unwrap();
        assert_eq!(plan.users, 10);
        assert_eq!(plan.visits, 5);
        assert_eq!(plan.drain_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_usage_errors() {
        assert!(Config::try_parse_from(["portal-loadgen"]).is_err());
        assert!(Config::try_parse_from(["portal-loadgen", "https://lms.example.edu/"]).is_err());
        assert!(Config::try_parse_from(["portal-loadgen", "https://lms.example.edu/", "many"]).is_err());
        assert!(Config::try_parse_from(["portal-loadgen", "https://lms.example.edu/", "0"]).is_err());
        assert!(Config::try_parse_from(["portal-loadgen", "not a url", "3"]).is_err());
    }
}

//! Drives simulated users and joins them at the end of the run.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, info_span, warn, Span};
use url::Url;

use crate::credentials::{self, Credentials};
use crate::engine::{EngineSettings, HttpEngine, Request, Response};
use crate::error::LoadError;
use crate::names;
use crate::navigation::{Action, Navigator};
use crate::patterns::Portal;
use crate::stats::{Report, StatsCollector};

// =============================================================================
// Simulated user
// =============================================================================

/// One user's chain. Moved into each completion handler in turn, so only the
/// handler for the single outstanding request can touch it.
pub struct Session {
    span: Span,
    engine: HttpEngine,
    navigator: Navigator,
    stats: Arc<StatsCollector>,
}

impl Session {
    pub fn new(
        name: &str,
        engine: HttpEngine,
        navigator: Navigator,
        stats: Arc<StatsCollector>,
    ) -> Self {
        Self {
            span: info_span!("session", user = %name),
            engine,
            navigator,
            stats,
        }
    }

    /// Sends the login request and returns without waiting for it.
    pub fn start(mut self, credentials: &Credentials) {
        let span = self.span.clone();
        let _entered = span.enter();

        info!("Logging in as user {}", credentials.username);
        match self.navigator.login(credentials) {
            Ok(request) => self.send(request),
            Err(e) => warn!("FAILED: {}", e),
        }
    }

    fn send(self, request: Request) {
        let engine = self.engine.clone();
        engine.submit(request, move |response| self.handle(response));
    }

    fn handle(mut self, response: &Response) {
        let span = self.span.clone();
        let _entered = span.enter();

        let step = self.navigator.on_response(response);

        if let Some(sample) = step.sample {
            let (site_id, site_title) = self
                .navigator
                .site()
                .map(|site| (site.id.as_str(), site.title.as_str()))
                .unwrap_or_default();
            let status = response
                .status()
                .map(|status| status.to_string())
                .unwrap_or_default();

            info!(
                response_ms = sample.duration_ms,
                status = %status,
                site_id,
                site_title,
                tool_title = %sample.label,
                remaining = self.navigator.remaining_visits(),
                "tool visited"
            );
            self.stats.record(sample);
        }

        match step.action {
            Action::Send(request) => self.send(request),
            Action::Done => {
                let status = self.engine.status_snapshot();
                info!(
                    "Logged out; requests currently pending: {}",
                    status.pending
                );
            }
            Action::Fail(e) => {
                warn!("FAILED: {}", e);
                debug!("Last response body:\n{}", response.text());
            }
        }
    }
}

// =============================================================================
// Run
// =============================================================================

#[derive(Debug, Clone)]
pub struct RunPlan {
    pub base_url: Url,
    pub users: usize,
    pub visits: u32,
    pub credentials: Vec<Credentials>,
    pub portal: Arc<Portal>,
    pub engine: EngineSettings,
    /// How long to wait for each engine to go idle. `None` waits forever.
    pub drain_timeout: Option<Duration>,
}

/// Builds one engine per user. Nothing is sent until all of them exist, so a
/// client that fails to build leaves no user running.
fn start_engines(settings: &EngineSettings, users: usize) -> Result<Vec<HttpEngine>, LoadError> {
    (0..users).map(|_| HttpEngine::start(settings)).collect()
}

/// Starts every user at once, waits for all engines to drain, then reports.
pub async fn run(plan: RunPlan) -> Result<Report, LoadError> {
    let stats = Arc::new(StatsCollector::new());
    let assigned = credentials::assign(&plan.credentials, plan.users);

    let engines = start_engines(&plan.engine, assigned.len())?;

    {
        let mut rng = rand::rng();
        for (credentials, engine) in assigned.into_iter().zip(&engines) {
            let navigator = Navigator::new(
                Arc::clone(&plan.portal),
                plan.base_url.clone(),
                plan.visits,
                StdRng::from_rng(&mut rng),
            );
            let name = names::display_name(&mut rng);

            Session::new(&name, engine.clone(), navigator, Arc::clone(&stats))
                .start(credentials);
        }
    }

    info!("Started {} simulated users", engines.len());

    let drained = join_all(
        engines
            .iter()
            .map(|engine| engine.drain_within(plan.drain_timeout)),
    )
    .await;

    for (engine, idle) in engines.into_iter().zip(drained) {
        if !idle {
            warn!(
                "Drain timed out with {} requests pending",
                engine.status_snapshot().pending
            );
        }
        engine.stop();
    }

    info!("All users finished; {} samples recorded", stats.len());
    Ok(stats.report())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_engines_are_built_idle_before_sessions() {
        let engines = start_engines(&EngineSettings::default(), 3).unwrap();

        assert_eq!(engines.len(), 3);
        for engine in engines {
            let status = engine.status_snapshot();
            assert_eq!(status.pending, 0);
            assert_eq!(status.issued, 0);
            engine.stop();
        }
    }

    #[tokio::test]
    async fn test_zero_users_report_nothing() {
        let plan = RunPlan {
            base_url: Url::parse("http://127.0.0.1:9/portal").unwrap(),
            users: 0,
            visits: 1,
            credentials: vec![Credentials {
                username: "alice".to_string(),
                password: "p1".to_string(),
            }],
            portal: Arc::new(Portal::sakai(Vec::new()).unwrap()),
            engine: EngineSettings::default(),
            drain_timeout: Some(Duration::from_secs(5)),
        };

        let report = run(plan).await.unwrap();
        assert!(report.operations.is_empty());
        assert!(report.overall.is_none());
    }
}

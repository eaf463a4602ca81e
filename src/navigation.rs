//! Per-user navigation through the portal.
//!
//! A [`Navigator`] never touches the network. It is fed each completed
//! [`Response`] and answers with the next [`Request`] to send, plus a
//! latency sample whenever a tool visit finishes. The caller owns the
//! navigator and only sends one request at a time, so every transition sees
//! the body of the request issued by the previous one.
//!
//! The phases a user moves through:
//!
//! 1. log in, then pick a random site from the login landing page;
//! 2. pick a random tool from the site (or the previous tool) page, going
//!    through the legacy page's iframe when needed, `visits` times;
//! 3. follow the workspace link from the last tool page;
//! 4. log out.

use std::sync::Arc;

use rand::prelude::IndexedRandom;
use rand::rngs::StdRng;
use url::Url;

use crate::credentials::Credentials;
use crate::engine::{Request, Response};
use crate::error::NavigationError;
use crate::patterns::{Portal, Site, Tool};
use crate::stats::LatencySample;

/// Which request is outstanding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    Idle,
    LoggingIn,
    OpeningSite,
    /// Legacy page fetched first; the real tool sits in its iframe.
    OpeningPage { tool: Tool },
    VisitingTool {
        tool: Tool,
        page_ms: u64,
        page_failed: bool,
    },
    ReturningToWorkspace,
    LoggingOut,
    Finished,
    Failed,
}

#[derive(Debug)]
pub enum Action {
    Send(Request),
    Done,
    Fail(NavigationError),
}

#[derive(Debug)]
pub struct Step {
    pub action: Action,
    pub sample: Option<LatencySample>,
}

#[derive(Debug)]
pub struct Navigator {
    portal: Arc<Portal>,
    base_url: Url,
    visits: u32,
    remaining: u32,
    site: Option<Site>,
    state: State,
    rng: StdRng,
}

impl Navigator {
    pub fn new(portal: Arc<Portal>, base_url: Url, visits: u32, rng: StdRng) -> Self {
        Self {
            portal,
            base_url,
            visits,
            remaining: visits,
            site: None,
            state: State::Idle,
            rng,
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn site(&self) -> Option<&Site> {
        self.site.as_ref()
    }

    pub fn remaining_visits(&self) -> u32 {
        self.remaining
    }

    /// Starts the chain with the login POST.
    pub fn login(&mut self, credentials: &Credentials) -> Result<Request, NavigationError> {
        let url = self.resolve(&self.portal.login_path)?;
        self.remaining = self.visits;
        self.site = None;
        self.state = State::LoggingIn;
        Ok(Request::post(url, self.portal.login_form(credentials)))
    }

    /// Consumes the response to the outstanding request.
    pub fn on_response(&mut self, response: &Response) -> Step {
        let body = response.text();

        match std::mem::replace(&mut self.state, State::Failed) {
            State::LoggingIn => {
                let next = self.select_site(&body);
                self.proceed(next, None)
            }
            State::OpeningSite => {
                let next = self.select_tool(&body);
                self.proceed(next, None)
            }
            State::OpeningPage { tool } => {
                let page_ms = response.duration_ms().unwrap_or_default();
                let page_failed = response.is_error();
                let title = tool.title.clone();

                match self.open_iframe(tool, page_ms, page_failed, &body) {
                    Ok(request) => self.proceed(Ok(request), None),
                    // The visit ends on the page hop; it still counts.
                    Err(e) => {
                        let sample = LatencySample::new(title, page_ms, page_failed);
                        self.proceed(Err(e), Some(sample))
                    }
                }
            }
            State::VisitingTool {
                tool,
                page_ms,
                page_failed,
            } => {
                let duration_ms = page_ms + response.duration_ms().unwrap_or_default();
                let sample = LatencySample::new(
                    tool.title,
                    duration_ms,
                    page_failed || response.is_error(),
                );

                self.remaining = self.remaining.saturating_sub(1);
                let next = if self.remaining == 0 {
                    self.return_to_workspace(&body)
                } else {
                    self.select_tool(&body)
                };
                self.proceed(next, Some(sample))
            }
            State::ReturningToWorkspace => {
                let next = self.logout();
                self.proceed(next, None)
            }
            State::LoggingOut => {
                self.state = State::Finished;
                Step {
                    action: Action::Done,
                    sample: None,
                }
            }
            // Nothing should be outstanding; leave the state as it was.
            previous @ (State::Idle | State::Finished | State::Failed) => {
                self.state = previous;
                Step {
                    action: Action::Done,
                    sample: None,
                }
            }
        }
    }

    fn proceed(
        &mut self,
        next: Result<Request, NavigationError>,
        sample: Option<LatencySample>,
    ) -> Step {
        let action = match next {
            Ok(request) => Action::Send(request),
            Err(e) => {
                self.state = State::Failed;
                Action::Fail(e)
            }
        };
        Step { action, sample }
    }

    fn select_site(&mut self, body: &str) -> Result<Request, NavigationError> {
        let site = self
            .portal
            .sites(body)
            .choose(&mut self.rng)
            .cloned()
            .ok_or(NavigationError::NoSites)?;

        let url = self.resolve(&self.portal.site_path(&site.id))?;
        self.site = Some(site);
        self.state = State::OpeningSite;
        Ok(Request::get(url))
    }

    fn select_tool(&mut self, body: &str) -> Result<Request, NavigationError> {
        let tool = match self.portal.tools(body).choose(&mut self.rng) {
            Some(tool) => tool.clone(),
            None => {
                return Err(NavigationError::NoTools {
                    site_id: self.site.as_ref().map(|s| s.id.clone()).unwrap_or_default(),
                })
            }
        };

        let url = self.resolve(&tool.url)?;
        self.state = if tool.is_legacy_page() {
            State::OpeningPage { tool }
        } else {
            State::VisitingTool {
                tool,
                page_ms: 0,
                page_failed: false,
            }
        };
        Ok(Request::get(url))
    }

    fn open_iframe(
        &mut self,
        tool: Tool,
        page_ms: u64,
        page_failed: bool,
        body: &str,
    ) -> Result<Request, NavigationError> {
        let inner = self
            .portal
            .iframe_tool(body)
            .ok_or_else(|| NavigationError::NoIframe {
                page: tool.url.clone(),
            })?;

        let url = self.resolve(&inner)?;
        self.state = State::VisitingTool {
            tool,
            page_ms,
            page_failed,
        };
        Ok(Request::get(url))
    }

    fn return_to_workspace(&mut self, body: &str) -> Result<Request, NavigationError> {
        let workspace = self
            .portal
            .workspace(body)
            .ok_or(NavigationError::NoWorkspace)?;

        let url = self.resolve(&workspace)?;
        self.state = State::ReturningToWorkspace;
        Ok(Request::get(url))
    }

    fn logout(&mut self) -> Result<Request, NavigationError> {
        let url = self.resolve(&self.portal.logout_path)?;
        self.state = State::LoggingOut;
        Ok(Request::post(url, Vec::new()))
    }

    fn resolve(&self, path: &str) -> Result<Url, NavigationError> {
        self.base_url
            .join(path)
            .map_err(|source| NavigationError::BadUrl {
                path: path.to_string(),
                source,
            })
    }
}

//! Simulated-user load testing for Sakai portals.
//!
//! Each simulated user owns an [`engine::HttpEngine`] and a
//! [`navigation::Navigator`]. The user logs in, opens a random site, visits
//! random tools by following scraped links, returns to their workspace and
//! logs out. Every tool visit's latency goes to a shared
//! [`stats::StatsCollector`], which renders the final histogram report.

pub mod config;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod names;
pub mod navigation;
pub mod patterns;
pub mod runner;
pub mod stats;

pub use config::Config;
pub use error::{LoadError, NavigationError};
pub use runner::{run, RunPlan};
pub use stats::{Report, StatsCollector};

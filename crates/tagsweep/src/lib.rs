//! Metric tag reconciliation for Datadog organizations.
//!
//! Pulls each organization's active metrics, monitor queries, and dashboard
//! widget queries, works out which tags are actually referenced, and pushes
//! an allow-list tag configuration back to the platform so unused tag
//! cardinality is suppressed.

pub mod collector;
pub mod config;
pub mod engine;
pub mod models;
pub mod orchestrator;
pub mod transport;

pub use config::{ApiUrls, Credential, Settings};
pub use engine::{Decision, UsageTable};
pub use transport::{RateLimit, RateLimitedClient, TransportError};

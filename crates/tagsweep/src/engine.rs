//! Tag-usage reconciliation: scan queries, classify metrics, apply writes.
//!
//! Matching is plain substring search over free-text query strings for both
//! metric names and tag names; there is no query parser. A tag name occurring
//! inside another identifier counts as a reference, and every decision is
//! defined against that substring semantics.

use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::collector::Collector;
use crate::config::ApiUrls;
use crate::models::{TagConfigurationRequest, TagObservation};
use crate::transport::{RateLimitedClient, TransportError};

/// Literal token that exempts a metric from tag pruning for the run.
const WILDCARD: &str = "{*}";

/// Per-metric outcome of a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// A referencing query used `{*}`; leave the metric alone this run.
    WildcardExempt,
    /// Allow exactly these tags, in listing order.
    KeepSubset(Vec<String>),
    /// The metric has a tag configuration but nothing references its tags.
    DisableAll,
    /// No tag configuration to reconcile.
    Untouched,
}

/// Tag-usage table for one reconciliation pass.
///
/// Counts only ever increase during the pass and are discarded with the
/// table at the end of the run.
#[derive(Debug, Default)]
pub struct UsageTable {
    entries: HashMap<String, Vec<TagObservation>>,
    exempt: HashSet<String>,
}

impl UsageTable {
    /// Seed the table from the related-assets baseline. Metrics absent from
    /// the baseline have no entry and end up untouched.
    #[must_use]
    pub fn seeded(baseline: HashMap<String, Vec<TagObservation>>) -> Self {
        Self {
            entries: baseline,
            exempt: HashSet::new(),
        }
    }

    /// Scan every (query, metric) pair, crediting at most one tag per pair.
    ///
    /// A query containing `{*}` exempts every metric it references and drops
    /// them from the table; otherwise the first tag (in seeded order) whose
    /// name occurs in the query text gets the single credit for that pair.
    pub fn scan(&mut self, metrics: &[String], queries: &[String]) {
        for query in queries {
            for metric in metrics {
                if !query.contains(metric.as_str()) {
                    continue;
                }
                if query.contains(WILDCARD) {
                    self.entries.remove(metric);
                    self.exempt.insert(metric.clone());
                    continue;
                }
                if let Some(tags) = self.entries.get_mut(metric) {
                    if let Some(tag) = tags.iter_mut().find(|t| query.contains(t.name.as_str())) {
                        tag.count += 1;
                    }
                }
            }
        }
    }

    /// Classify one metric after the scan pass. Each metric lands in exactly
    /// one category per run.
    #[must_use]
    pub fn classify(&self, metric: &str) -> Decision {
        if self.exempt.contains(metric) {
            return Decision::WildcardExempt;
        }
        match self.entries.get(metric) {
            None => Decision::Untouched,
            Some(tags) => {
                let used: Vec<String> = tags
                    .iter()
                    .filter(|t| t.count > 0)
                    .map(|t| t.name.clone())
                    .collect();
                if used.is_empty() {
                    Decision::DisableAll
                } else {
                    Decision::KeepSubset(used)
                }
            }
        }
    }

    #[cfg(test)]
    fn count_of(&self, metric: &str, tag: &str) -> Option<u64> {
        self.entries
            .get(metric)?
            .iter()
            .find(|t| t.name == tag)
            .map(|t| t.count)
    }
}

/// Applies per-metric decisions for one organization through its transport.
pub struct Reconciler<'a> {
    transport: &'a RateLimitedClient,
    urls: &'a ApiUrls,
    collector: &'a Collector<'a>,
    dry_run: bool,
}

impl<'a> Reconciler<'a> {
    #[must_use]
    pub fn new(
        transport: &'a RateLimitedClient,
        urls: &'a ApiUrls,
        collector: &'a Collector<'a>,
        dry_run: bool,
    ) -> Self {
        Self {
            transport,
            urls,
            collector,
            dry_run,
        }
    }

    /// Apply one metric's decision.
    ///
    /// For metrics that get a write, deletion of the existing configuration
    /// always precedes the new write; the two are not atomic, so a failure
    /// in between leaves the metric unconfigured until the next run. A
    /// failed type lookup downgrades the write to a logged skip.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete or the configuration write fails at
    /// the transport level.
    pub async fn apply(&self, metric: &str, decision: &Decision) -> Result<(), TransportError> {
        let tags = match decision {
            Decision::WildcardExempt => {
                info!(metric, "wildcard query references this metric, leaving tags untouched");
                return Ok(());
            }
            Decision::Untouched => {
                debug!(metric, "no tag configuration to reconcile");
                return Ok(());
            }
            Decision::KeepSubset(tags) => tags.clone(),
            Decision::DisableAll => Vec::new(),
        };

        if self.dry_run {
            info!(metric, tags = ?tags, "dry run, would reset tag configuration");
            return Ok(());
        }

        self.delete_tag_configuration(metric).await?;

        let metric_type = match self.collector.metric_type(metric).await {
            Ok(t) => t,
            Err(e) => {
                warn!(metric, error = %e, "cannot resolve metric type, skipping tag write");
                return Ok(());
            }
        };

        let request = TagConfigurationRequest::allow_list(metric, &metric_type, tags);
        let url = format!("{}/metrics/{metric}/tags", self.urls.v2);
        let response = self.transport.post_json(&url, &request).await?;
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        info!(metric, "{status}:{body}");
        Ok(())
    }

    async fn delete_tag_configuration(&self, metric: &str) -> Result<(), TransportError> {
        let url = format!("{}/metrics/{metric}/tags", self.urls.v2);
        let response = self.transport.delete(&url).await?;
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        info!(metric, "{status}:{body}");
        Ok(())
    }
}

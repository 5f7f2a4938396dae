//! Inventory collection for one organization.
//!
//! Translates the reconciliation engine's informational needs into transport
//! calls and parses the responses into the data model.

use chrono::{Duration, Utc};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::config::ApiUrls;
use crate::models::{
    ActiveMetricsResponse, DashboardDetail, DashboardsResponse, MetricDetail, Monitor,
    RelatedMetricsResponse, TagObservation,
};
use crate::transport::{RateLimitedClient, TransportError};

/// Fetches the inventory the reconciliation engine consumes.
pub struct Collector<'a> {
    transport: &'a RateLimitedClient,
    urls: &'a ApiUrls,
}

impl<'a> Collector<'a> {
    #[must_use]
    pub fn new(transport: &'a RateLimitedClient, urls: &'a ApiUrls) -> Self {
        Self { transport, urls }
    }

    /// Names of metrics active within the trailing window.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing request fails.
    pub async fn active_metrics(&self, window_days: i64) -> Result<Vec<String>, TransportError> {
        let from = (Utc::now() - Duration::days(window_days)).timestamp();
        let url = format!("{}/metrics?from={from}", self.urls.v1);
        let response: ActiveMetricsResponse = self.transport.get_json(&url).await?;
        Ok(response.metrics)
    }

    /// One query string per monitor that defines one.
    ///
    /// # Errors
    ///
    /// Returns an error if the monitor listing request fails.
    pub async fn monitor_queries(&self) -> Result<Vec<String>, TransportError> {
        let url = format!("{}/monitor", self.urls.v1);
        let monitors: Vec<Monitor> = self.transport.get_json(&url).await?;
        Ok(monitors.into_iter().filter_map(|m| m.query).collect())
    }

    /// Ids of every dashboard in the organization.
    ///
    /// # Errors
    ///
    /// Returns an error if the dashboard listing request fails.
    pub async fn dashboard_ids(&self) -> Result<Vec<String>, TransportError> {
        let url = format!("{}/dashboard", self.urls.v1);
        let response: DashboardsResponse = self.transport.get_json(&url).await?;
        Ok(response.dashboards.into_iter().map(|d| d.id).collect())
    }

    /// Widget request queries of a single dashboard.
    ///
    /// # Errors
    ///
    /// Returns an error if the detail fetch fails.
    pub async fn dashboard_queries(&self, id: &str) -> Result<Vec<String>, TransportError> {
        let url = format!("{}/dashboard/{id}", self.urls.v1);
        let detail: DashboardDetail = self.transport.get_json(&url).await?;
        Ok(detail.request_queries())
    }

    /// Fetch every dashboard's widget queries with a bounded fan-out.
    ///
    /// The listing endpoint carries no widget detail, so this is one request
    /// per dashboard and dominates request volume. A failed dashboard is
    /// logged and skipped; the rest proceed.
    pub async fn all_dashboard_queries(&self, ids: &[String], concurrency: usize) -> Vec<String> {
        stream::iter(ids)
            .map(|id| async move {
                debug!(dashboard = %id, "fetching dashboard detail");
                match self.dashboard_queries(id).await {
                    Ok(queries) => queries,
                    Err(e) => {
                        warn!(dashboard = %id, error = %e, "skipping dashboard detail fetch");
                        Vec::new()
                    }
                }
            })
            .buffer_unordered(concurrency.max(1))
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// Tags currently configured per metric, seeded at count zero and kept
    /// in the order the platform lists them. That order is the first-match
    /// enumeration order during the scan pass.
    ///
    /// # Errors
    ///
    /// Returns an error if the related-assets listing request fails.
    pub async fn used_tags_by_metric(
        &self,
        window_seconds: u64,
    ) -> Result<HashMap<String, Vec<TagObservation>>, TransportError> {
        let url = format!(
            "{}/metrics?filter[related_assets]=true&window[seconds]={window_seconds}",
            self.urls.v2
        );
        let response: RelatedMetricsResponse = self.transport.get_json(&url).await?;
        Ok(response
            .data
            .into_iter()
            .filter(|m| m.kind == "manage_tags")
            .map(|m| {
                let tags = m
                    .attributes
                    .tags
                    .into_iter()
                    .map(TagObservation::unused)
                    .collect();
                (m.id, tags)
            })
            .collect())
    }

    /// Resolve a metric's type for the write envelope. Called only for
    /// metrics about to be written; untouched metrics cost no extra round
    /// trip.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata fetch fails or the metadata carries
    /// no type.
    pub async fn metric_type(&self, metric: &str) -> Result<String, TransportError> {
        let url = format!("{}/metrics/{metric}", self.urls.v1);
        let detail: MetricDetail = self.transport.get_json(&url).await?;
        detail
            .metric_type
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                TransportError::InvalidResponse(format!("metric {metric} has no type in its metadata"))
            })
    }
}

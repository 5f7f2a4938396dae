//! Sequential per-organization reconciliation.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::collector::Collector;
use crate::config::{ApiUrls, Credential, Settings};
use crate::engine::{Reconciler, UsageTable};
use crate::transport::{RateLimit, RateLimitedClient};

/// Everything scoped to one organization's processing.
///
/// The transport (and with it the credential headers) lives exactly as long
/// as this context; the next organization gets a fresh one.
pub struct OrgContext {
    pub organization: String,
    pub urls: ApiUrls,
    pub transport: RateLimitedClient,
}

impl OrgContext {
    /// Build the per-organization transport and derived API roots.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot be constructed from the
    /// credential.
    pub fn new(credential: &Credential, settings: &Settings) -> Result<Self> {
        let transport = RateLimitedClient::new(
            &credential.api_key,
            &credential.app_key,
            RateLimit {
                requests_per_second: settings.requests_per_second,
                base_interval: Duration::from_secs(1),
                max_retries: settings.max_rate_limit_retries,
            },
        )
        .with_context(|| {
            format!(
                "failed to build transport for organization {}",
                credential.organization
            )
        })?;

        Ok(Self {
            organization: credential.organization.clone(),
            urls: ApiUrls::from_base(&settings.base_url),
            transport,
        })
    }
}

/// Process every configured organization in sequence.
///
/// Organization-level failures are logged and do not stop later
/// organizations.
pub async fn run(credentials: &[Credential], settings: &Settings) -> Result<()> {
    if credentials.is_empty() {
        info!("no credentials configured, nothing to do");
        return Ok(());
    }

    for credential in credentials {
        if !credential.is_complete() {
            warn!(
                org = %credential.organization,
                "API key or application key missing, skipping organization"
            );
            continue;
        }

        info!(org = %credential.organization, "using credentials");
        let ctx = match OrgContext::new(credential, settings) {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!(
                    org = %credential.organization,
                    error = %e,
                    "failed to build transport, skipping organization"
                );
                continue;
            }
        };
        if let Err(e) = reconcile_organization(&ctx, settings).await {
            error!(org = %ctx.organization, error = %e, "error processing metrics");
        }
        // ctx, and with it the credential-bearing transport, drops here,
        // before the next organization's context is built.
    }

    Ok(())
}

/// Gather the inventory, scan, classify, and apply per-metric decisions.
async fn reconcile_organization(ctx: &OrgContext, settings: &Settings) -> Result<()> {
    let collector = Collector::new(&ctx.transport, &ctx.urls);

    let metrics = collector
        .active_metrics(settings.metrics_window_days)
        .await
        .context("failed to list active metrics")?;
    let mut queries = collector
        .monitor_queries()
        .await
        .context("failed to list monitor queries")?;
    let dashboards = collector
        .dashboard_ids()
        .await
        .context("failed to list dashboards")?;
    queries.extend(
        collector
            .all_dashboard_queries(&dashboards, settings.dashboard_concurrency)
            .await,
    );
    let baseline = collector
        .used_tags_by_metric(settings.related_window_seconds)
        .await
        .context("failed to list configured tags per metric")?;

    info!(
        org = %ctx.organization,
        metrics = metrics.len(),
        queries = queries.len(),
        dashboards = dashboards.len(),
        "inventory collected"
    );

    let mut table = UsageTable::seeded(baseline);
    table.scan(&metrics, &queries);

    let reconciler = Reconciler::new(&ctx.transport, &ctx.urls, &collector, settings.dry_run);
    for metric in &metrics {
        let decision = table.classify(metric);
        if let Err(e) = reconciler.apply(metric, &decision).await {
            warn!(metric = %metric, error = %e, "failed to apply tag decision");
        }
    }

    Ok(())
}

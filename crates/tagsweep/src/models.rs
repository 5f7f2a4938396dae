//! Wire models for the Datadog API surface tagsweep consumes.

use serde::{Deserialize, Serialize};

/// One entry of `GET /api/v1/monitor`.
#[derive(Debug, Clone, Deserialize)]
pub struct Monitor {
    /// Alert query; absent on some monitor types.
    pub query: Option<String>,
}

/// `GET /api/v1/metrics?from={unixSeconds}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ActiveMetricsResponse {
    pub metrics: Vec<String>,
}

/// `GET /api/v1/dashboard`.
#[derive(Debug, Clone, Deserialize)]
pub struct DashboardsResponse {
    pub dashboards: Vec<DashboardSummary>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardSummary {
    pub id: String,
}

/// `GET /api/v1/dashboard/{id}`. Only the widget request queries matter;
/// everything else in the (large) detail document is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct DashboardDetail {
    #[serde(default)]
    pub widgets: Vec<Widget>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Widget {
    pub definition: Option<WidgetDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WidgetDefinition {
    #[serde(default)]
    pub requests: Option<Vec<WidgetRequest>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WidgetRequest {
    #[serde(default)]
    pub queries: Option<Vec<WidgetQuery>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WidgetQuery {
    pub query: Option<String>,
}

impl DashboardDetail {
    /// Flatten every widget's request queries into one list.
    #[must_use]
    pub fn request_queries(self) -> Vec<String> {
        self.widgets
            .into_iter()
            .filter_map(|w| w.definition)
            .filter_map(|d| d.requests)
            .flatten()
            .filter_map(|r| r.queries)
            .flatten()
            .filter_map(|q| q.query)
            .collect()
    }
}

/// `GET /api/v2/metrics?filter[related_assets]=true&window[seconds]={n}`.
#[derive(Debug, Clone, Deserialize)]
pub struct RelatedMetricsResponse {
    pub data: Vec<RelatedMetric>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelatedMetric {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: RelatedMetricAttributes,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelatedMetricAttributes {
    #[serde(default)]
    pub tags: Vec<String>,
}

/// `GET /api/v1/metrics/{name}` metadata, used for the type lookup.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricDetail {
    #[serde(rename = "type")]
    pub metric_type: Option<String>,
}

/// One tag on one metric, with the number of query references observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagObservation {
    pub name: String,
    pub count: u64,
}

impl TagObservation {
    /// Baseline observation as seeded from the related-assets listing.
    #[must_use]
    pub fn unused(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            count: 0,
        }
    }
}

/// Write envelope for `POST`/`PATCH /api/v2/metrics/{name}/tags`.
#[derive(Debug, Clone, Serialize)]
pub struct TagConfigurationRequest {
    pub data: TagConfigurationData,
}

#[derive(Debug, Clone, Serialize)]
pub struct TagConfigurationData {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    pub attributes: TagConfigurationAttributes,
}

#[derive(Debug, Clone, Serialize)]
pub struct TagConfigurationAttributes {
    pub metric_type: String,
    pub exclude_tags_mode: bool,
    pub tags: Vec<String>,
}

impl TagConfigurationRequest {
    /// Allow-list configuration: exactly `tags` remain queryable. An empty
    /// list disables tagging for the metric.
    #[must_use]
    pub fn allow_list(metric: &str, metric_type: &str, tags: Vec<String>) -> Self {
        Self {
            data: TagConfigurationData {
                kind: "manage_tags".to_string(),
                id: metric.to_string(),
                attributes: TagConfigurationAttributes {
                    metric_type: metric_type.to_string(),
                    exclude_tags_mode: false,
                    tags,
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn allow_list_envelope_shape() {
        let request = TagConfigurationRequest::allow_list(
            "requests.count",
            "count",
            vec!["env".to_string()],
        );
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "data": {
                    "type": "manage_tags",
                    "id": "requests.count",
                    "attributes": {
                        "metric_type": "count",
                        "exclude_tags_mode": false,
                        "tags": ["env"]
                    }
                }
            })
        );
    }

    #[test]
    fn empty_allow_list_disables_tagging() {
        let request = TagConfigurationRequest::allow_list("unused.metric", "gauge", Vec::new());
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["data"]["attributes"]["tags"], json!([]));
        assert_eq!(value["data"]["attributes"]["exclude_tags_mode"], json!(false));
    }

    #[test]
    fn flattens_widget_request_queries() {
        let detail: DashboardDetail = serde_json::from_value(json!({
            "widgets": [
                {
                    "definition": {
                        "requests": [
                            {"queries": [{"query": "avg:a.b{env}"}, {"query": null}]},
                            {"queries": null}
                        ]
                    }
                },
                {"definition": {"requests": null}},
                {"definition": null},
                {
                    "definition": {
                        "requests": [{"queries": [{"query": "sum:c.d{host}"}]}]
                    }
                }
            ]
        }))
        .unwrap();

        assert_eq!(
            detail.request_queries(),
            vec!["avg:a.b{env}".to_string(), "sum:c.d{host}".to_string()]
        );
    }

    #[test]
    fn dashboard_detail_without_widgets_is_empty() {
        let detail: DashboardDetail = serde_json::from_value(json!({})).unwrap();
        assert!(detail.request_queries().is_empty());
    }
}

//! HTTP client for the REST query boundary.
//!
//! | Query        | Endpoint                     | Parameters                                        |
//! |--------------|------------------------------|---------------------------------------------------|
//! | orders       | `GET {base}/orders`          | `workspaceId, limit, dateFrom?, dateTo?, includeCancelled?` |
//! | daily sales  | `GET {base}/orders/daily-sales` | `workspaceId, dateFrom, dateTo`                |
//! | metrics      | `GET {base}/metrics`         | `workspaceId, days, dateFrom, dateTo`             |
//!
//! Instants are sent as RFC 3339 with millisecond precision, calendar
//! dates as `YYYY-MM-DD`. No retries: a failed query is retried by the
//! next fallback tick.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::application::ports::{
    DailySalesQuery, DailySalesReport, MetricsQuery, MetricsReport, OrdersPage, OrdersQuery,
    SnapshotError, SnapshotSource,
};

const MAX_ERROR_BODY_CHARS: usize = 256;

/// REST client settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestSettings {
    /// Base URL, e.g. `https://api.example.com/api/integrations/mercadolivre`.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// `reqwest` implementation of [`SnapshotSource`].
#[derive(Debug, Clone)]
pub struct HttpSnapshotSource {
    client: Client,
    base_url: String,
}

impl HttpSnapshotSource {
    /// Create a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(settings: &RestSettings) -> Result<Self, SnapshotError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| SnapshotError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, SnapshotError> {
        let url = format!("{}{path}", self.base_url);
        tracing::debug!(%url, ?params, "snapshot query");

        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(|e| SnapshotError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SnapshotError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(SnapshotError::Status {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        serde_json::from_str(&body).map_err(|e| SnapshotError::Decode(e.to_string()))
    }
}

fn instant(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    async fn fetch_orders(&self, query: &OrdersQuery) -> Result<OrdersPage, SnapshotError> {
        let mut params = vec![
            ("workspaceId", query.workspace_id.as_str().to_string()),
            ("limit", query.limit.to_string()),
        ];
        if let Some(from) = query.date_from {
            params.push(("dateFrom", instant(from)));
        }
        if let Some(to) = query.date_to {
            params.push(("dateTo", instant(to)));
        }
        if query.include_cancelled {
            params.push(("includeCancelled", "true".to_string()));
        }
        self.get("/orders", &params).await
    }

    async fn fetch_daily_sales(
        &self,
        query: &DailySalesQuery,
    ) -> Result<DailySalesReport, SnapshotError> {
        let params = [
            ("workspaceId", query.workspace_id.as_str().to_string()),
            ("dateFrom", query.window.from().to_string()),
            ("dateTo", query.window.to().to_string()),
        ];
        self.get("/orders/daily-sales", &params).await
    }

    async fn fetch_metrics(&self, query: &MetricsQuery) -> Result<MetricsReport, SnapshotError> {
        let params = [
            ("workspaceId", query.workspace_id.as_str().to_string()),
            ("days", query.window_days.to_string()),
            ("dateFrom", query.window.from().to_string()),
            ("dateTo", query.window.to().to_string()),
        ];
        self.get("/metrics", &params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::WorkspaceId;
    use crate::domain::window::DateWindow;
    use chrono::{NaiveDate, TimeZone};
    use rust_decimal::Decimal;
    use tokio_test::{assert_err, assert_ok};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source(server: &MockServer) -> HttpSnapshotSource {
        HttpSnapshotSource::new(&RestSettings {
            base_url: format!("{}/", server.uri()),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn window() -> DateWindow {
        DateWindow::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 30).unwrap(),
        )
    }

    #[tokio::test]
    async fn fetch_orders_sends_window_and_parses_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/orders"))
            .and(query_param("workspaceId", "ws-1"))
            .and(query_param("limit", "50"))
            .and(query_param("dateFrom", "2024-01-02T03:00:00.000Z"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "orders": [
                    {"id": "2000001", "dateCreated": "2024-01-02T12:00:00.000-03:00",
                     "totalAmount": 79.9, "items": [{"quantity": 1}], "status": "paid"}
                ],
                "paging": {"total": 12, "offset": 0, "limit": 50}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let page = assert_ok!(
            source(&server)
                .fetch_orders(&OrdersQuery {
                    workspace_id: WorkspaceId::new("ws-1"),
                    date_from: Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 0, 0).unwrap()),
                    date_to: None,
                    limit: 50,
                    include_cancelled: false,
                })
                .await
        );

        assert_eq!(page.orders.len(), 1);
        assert_eq!(page.orders[0].total_amount, Decimal::new(799, 1));
        assert_eq!(page.paging.total, 12);
    }

    #[tokio::test]
    async fn fetch_metrics_sends_period() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metrics"))
            .and(query_param("days", "30"))
            .and(query_param("dateFrom", "2024-01-01"))
            .and(query_param("dateTo", "2024-01-30"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "totalRevenue": 1500.5,
                "totalSales": 20,
                "lastSync": "2024-01-30T10:00:00.000Z"
            })))
            .mount(&server)
            .await;

        let report = source(&server)
            .fetch_metrics(&MetricsQuery {
                workspace_id: WorkspaceId::new("ws-1"),
                window_days: 30,
                window: window(),
            })
            .await
            .unwrap();

        assert_eq!(report.total_orders, 20);
        assert_eq!(report.total_revenue, Decimal::new(15005, 1));
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/orders/daily-sales"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let err = assert_err!(
            source(&server)
                .fetch_daily_sales(&DailySalesQuery {
                    workspace_id: WorkspaceId::new("ws-1"),
                    window: window(),
                })
                .await
        );

        assert!(matches!(
            err,
            SnapshotError::Status { status: 503, ref body } if body == "maintenance"
        ));
    }

    #[tokio::test]
    async fn undecodable_body_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metrics"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = assert_err!(
            source(&server)
                .fetch_metrics(&MetricsQuery {
                    workspace_id: WorkspaceId::new("ws-1"),
                    window_days: 30,
                    window: window(),
                })
                .await
        );

        assert!(matches!(err, SnapshotError::Decode(_)));
    }
}

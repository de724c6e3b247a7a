// Accrual Client - single status query against the external accrual system
//
// One request per call, bounded by the client timeout. Retries are not done
// here: an order that did not resolve stays NEW/PROCESSING and the poller
// picks it up on a later iteration.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::error::AppResult;
use crate::ledger::models::OrderStatus;

/// The authority's verdict, already mapped to local statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccrualUpdate {
    pub status: OrderStatus,
    /// Present only with `OrderStatus::Processed`
    pub accrual: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusOutcome {
    Resolved(AccrualUpdate),
    /// 204: the authority has no record of the order
    Unknown,
    /// 429: the caller must back off
    RateLimited,
    /// 5xx, unexpected status code or transport failure
    AuthorityError(String),
    /// 200 with a body that could not be trusted
    Malformed(String),
}

/// Anything that can tell the dispatcher an order's current status
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn check(&self, number: &str) -> StatusOutcome;
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
enum AuthorityStatus {
    Registered,
    Processing,
    Invalid,
    Processed,
}

impl From<AuthorityStatus> for OrderStatus {
    fn from(status: AuthorityStatus) -> Self {
        match status {
            AuthorityStatus::Registered => OrderStatus::New,
            AuthorityStatus::Processing => OrderStatus::Processing,
            AuthorityStatus::Invalid => OrderStatus::Invalid,
            AuthorityStatus::Processed => OrderStatus::Processed,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AccrualResponse {
    order: String,
    status: AuthorityStatus,
    #[serde(default)]
    accrual: Option<Decimal>,
}

/// HTTP client for the accrual system
pub struct AccrualClient {
    http: Client,
    base_url: String,
}

impl AccrualClient {
    pub fn new(base_url: &str, timeout: Duration) -> AppResult<Self> {
        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn order_url(&self, number: &str) -> String {
        format!("{}/api/orders/{}", self.base_url, number)
    }

    /// Maps a 200 body to an outcome, checking it against the requested number
    fn interpret_body(number: &str, body: &str) -> StatusOutcome {
        let response: AccrualResponse = match serde_json::from_str(body) {
            Ok(response) => response,
            Err(e) => return StatusOutcome::Malformed(format!("unparseable body: {}", e)),
        };

        if response.order != number {
            return StatusOutcome::Malformed(format!(
                "asked for order {}, got {}",
                number, response.order
            ));
        }

        let status = OrderStatus::from(response.status);
        let accrual = match (status, response.accrual) {
            (OrderStatus::Processed, None) => {
                return StatusOutcome::Malformed("PROCESSED without accrual".to_string())
            }
            (OrderStatus::Processed, Some(amount)) if amount.is_sign_negative() => {
                return StatusOutcome::Malformed(format!("negative accrual {}", amount))
            }
            (OrderStatus::Processed, Some(amount)) => Some(amount),
            // accrual only counts once the order is processed
            (_, _) => None,
        };

        StatusOutcome::Resolved(AccrualUpdate { status, accrual })
    }
}

#[async_trait]
impl StatusSource for AccrualClient {
    async fn check(&self, number: &str) -> StatusOutcome {
        let response = match self.http.get(self.order_url(number)).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return StatusOutcome::AuthorityError(format!("request timed out: {}", e))
            }
            Err(e) => return StatusOutcome::AuthorityError(format!("transport error: {}", e)),
        };

        let status = response.status();
        debug!(order = %number, %status, "Accrual system responded");

        match status {
            StatusCode::OK => match response.text().await {
                Ok(body) => Self::interpret_body(number, &body),
                Err(e) => StatusOutcome::AuthorityError(format!("failed reading body: {}", e)),
            },
            StatusCode::NO_CONTENT => StatusOutcome::Unknown,
            StatusCode::TOO_MANY_REQUESTS => StatusOutcome::RateLimited,
            s if s.is_server_error() => {
                StatusOutcome::AuthorityError(format!("authority returned {}", s))
            }
            other => StatusOutcome::AuthorityError(format!("unexpected status {}", other)),
        }
    }
}

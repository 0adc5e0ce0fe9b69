//! Dependency health: pinned npm packages against the registry, runtimes
//! against their end-of-life dates.

pub mod eol;
pub mod npm;

use std::time::Duration;

use chrono::{NaiveDate, Utc};
use futures::future::join_all;
use serde::Serialize;

use crate::api::{ApiError, RetryPolicy};
use crate::config::ReportsConfig;
pub use eol::{RuntimeReport, RuntimeStatus};
pub use npm::PackageReport;

#[derive(Debug, Clone, Serialize)]
pub struct DependencyReport {
    pub generated_at: String,
    pub packages: Vec<PackageReport>,
    pub runtimes: Vec<RuntimeReport>,
    pub outdated: usize,
    pub at_risk: usize,
    pub errors: usize,
}

/// REST lookups shared by both report sources.
pub struct ReportClient {
    client: reqwest::Client,
    retry: RetryPolicy,
    registry_url: String,
    eol_url: String,
}

impl ReportClient {
    pub fn new(config: &ReportsConfig, timeout: Duration, retry: RetryPolicy) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("board-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::permanent(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            retry,
            registry_url: config.registry_url.trim_end_matches('/').to_string(),
            eol_url: config.eol_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json(&self, label: &str, url: &str) -> Result<serde_json::Value, ApiError> {
        self.retry
            .run(label, || async {
                let resp = self.client.get(url).send().await?;
                let status = resp.status();
                if !status.is_success() {
                    let body = resp.text().await.unwrap_or_default();
                    return Err(ApiError::classify(
                        Some(status.as_u16()),
                        format!("GET {url}: {}", body.chars().take(200).collect::<String>()),
                    ));
                }
                Ok(resp.json().await?)
            })
            .await
    }
}

pub async fn build_report(client: &ReportClient, config: &ReportsConfig) -> DependencyReport {
    let today = Utc::now().date_naive();
    let packages = join_all(config.packages.iter().map(|p| npm::check(client, p))).await;
    let runtimes = join_all(
        config
            .runtimes
            .iter()
            .map(|r| eol::check(client, r, today, config.warn_days)),
    )
    .await;
    summarize(packages, runtimes, today)
}

fn summarize(
    packages: Vec<PackageReport>,
    runtimes: Vec<RuntimeReport>,
    today: NaiveDate,
) -> DependencyReport {
    let outdated = packages.iter().filter(|p| p.outdated).count();
    let at_risk = runtimes
        .iter()
        .filter(|r| matches!(r.status, RuntimeStatus::Eol | RuntimeStatus::ApproachingEol))
        .count();
    let errors = packages.iter().filter(|p| p.error.is_some()).count()
        + runtimes.iter().filter(|r| r.error.is_some()).count();
    DependencyReport {
        generated_at: today.format("%Y-%m-%d").to_string(),
        packages,
        runtimes,
        outdated,
        at_risk,
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let packages = vec![
            PackageReport::checked("express", "4.18.2", "5.1.0"),
            PackageReport::checked("axios", "1.7.0", "1.7.0"),
            PackageReport::failed("left-pad", "1.0.0", "API error (HTTP 404): Not found"),
        ];
        let runtimes = vec![
            RuntimeReport::classify("nodejs", "18", &serde_json::json!("2025-04-30"), today, 90),
            RuntimeReport::classify("nodejs", "22", &serde_json::json!("2027-04-30"), today, 90),
        ];
        let report = summarize(packages, runtimes, today);
        assert_eq!(report.outdated, 1);
        assert_eq!(report.at_risk, 1);
        assert_eq!(report.errors, 1);
        assert_eq!(report.generated_at, "2025-06-01");
    }
}

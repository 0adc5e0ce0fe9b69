use std::cmp::Ordering;

use serde::Serialize;
use tracing::warn;

use super::ReportClient;
use crate::config::PackagePin;

#[derive(Debug, Clone, Serialize)]
pub struct PackageReport {
    pub name: String,
    pub current: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest: Option<String>,
    pub outdated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PackageReport {
    pub fn checked(name: &str, current: &str, latest: &str) -> Self {
        Self {
            name: name.to_string(),
            current: current.to_string(),
            latest: Some(latest.to_string()),
            outdated: compare_versions(current, latest) == Ordering::Less,
            error: None,
        }
    }

    pub fn failed(name: &str, current: &str, error: &str) -> Self {
        Self {
            name: name.to_string(),
            current: current.to_string(),
            latest: None,
            outdated: false,
            error: Some(error.to_string()),
        }
    }
}

pub async fn check(client: &ReportClient, pin: &PackagePin) -> PackageReport {
    let url = format!(
        "{}/{}/latest",
        client.registry_url,
        urlencoding::encode(&pin.name)
    );
    match client.get_json("npm_latest", &url).await {
        Ok(body) => match body.get("version").and_then(|v| v.as_str()) {
            Some(latest) => PackageReport::checked(&pin.name, &pin.current, latest),
            None => PackageReport::failed(&pin.name, &pin.current, "registry response has no version"),
        },
        Err(e) => {
            warn!(package = %pin.name, error = %e, "registry lookup failed");
            PackageReport::failed(&pin.name, &pin.current, &e.to_string())
        }
    }
}

/// Numeric dotted comparison; ranges like `^4.18.2` compare by their digits
/// and anything after `-` or `+` is ignored.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let parts = |v: &str| -> Vec<u64> {
        v.trim()
            .trim_start_matches(|c: char| !c.is_ascii_digit())
            .split(['-', '+'])
            .next()
            .unwrap_or_default()
            .split('.')
            .map(|p| p.parse().unwrap_or(0))
            .collect()
    };
    let (pa, pb) = (parts(a), parts(b));
    let len = pa.len().max(pb.len());
    (0..len)
        .map(|i| {
            pa.get(i)
                .copied()
                .unwrap_or(0)
                .cmp(&pb.get(i).copied().unwrap_or(0))
        })
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal)
}

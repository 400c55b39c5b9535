use std::process::Command;
use std::time::Duration;

use log::info;
use serde::Deserialize;
use serde_json::json;

use crate::error::{PulseError, Result};
use crate::models::{months_between, Month, MonthlyTotals};

const ENDPOINT: &str = "https://bigquery.googleapis.com/bigquery/v2";
const POLL_TIMEOUT_MS: u64 = 10_000;

/// Aggregate over the public monthly archive tables. `payload` is a raw JSON
/// string there and `$.size` is the authoritative commit count per push;
/// SAFE_CAST guards against null and non-numeric values.
const QUERY_SQL: &str = "\
SELECT
  FORMAT_TIMESTAMP('%Y-%m', created_at) AS month,
  SUM(SAFE_CAST(JSON_EXTRACT_SCALAR(payload, '$.size') AS INT64)) AS commits
FROM `githubarchive.month.*`
WHERE _TABLE_SUFFIX BETWEEN @start_suffix AND @end_suffix
  AND type = 'PushEvent'
GROUP BY month
ORDER BY month";

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_reference: Option<JobReference>,
    #[serde(default)]
    job_complete: bool,
    #[serde(default)]
    rows: Vec<Row>,
    #[serde(default)]
    page_token: Option<String>,
    #[serde(default)]
    total_bytes_processed: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Deserialize, Debug)]
struct Row {
    #[serde(default)]
    f: Vec<Cell>,
}

#[derive(Deserialize, Debug)]
struct Cell {
    #[serde(default)]
    v: Option<serde_json::Value>,
}

/// BigQuery renders every scalar cell as a JSON string; a null aggregate
/// stays null and the month is omitted rather than reported as zero.
fn row_entry(row: &Row) -> Option<(Month, u64)> {
    let month = row.f.first()?.v.as_ref()?.as_str()?.parse::<Month>().ok()?;
    let commits = row.f.get(1)?.v.as_ref()?.as_str()?.parse::<u64>().ok()?;
    Some((month, commits))
}

/// Blocking REST client for the bulk aggregate path.
pub struct BigQueryClient {
    agent: ureq::Agent,
    endpoint: String,
    project: String,
    token: String,
}

impl BigQueryClient {
    pub fn new(project: &str) -> Result<Self> {
        let token = access_token()?;
        Ok(Self::with_endpoint(ENDPOINT, project, token))
    }

    pub fn with_endpoint(endpoint: &str, project: &str, token: String) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .timeout_read(Duration::from_secs(120))
            .build();
        BigQueryClient {
            agent,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            project: project.to_string(),
            token,
        }
    }

    /// Run the aggregate query over `start..=end` and return month totals.
    /// Blocks on the remote job, long-polling until it reports completion,
    /// then pages through the result rows.
    pub fn fetch_totals(&self, start: Month, end: Month) -> Result<MonthlyTotals> {
        info!(
            "running BigQuery aggregate ({} -> {}) billed to {}",
            start, end, self.project
        );

        let body = json!({
            "query": QUERY_SQL,
            "useLegacySql": false,
            "parameterMode": "NAMED",
            "queryParameters": [
                named_param("start_suffix", &start.suffix()),
                named_param("end_suffix", &end.suffix()),
            ],
            "timeoutMs": POLL_TIMEOUT_MS,
        });
        let url = format!("{}/projects/{}/queries", self.endpoint, self.project);
        let req = self
            .agent
            .post(&url)
            .set("Authorization", &self.auth_header());
        let mut resp: QueryResponse = self.call(req.send_json(body), &url)?;

        let mut totals = MonthlyTotals::new();
        let mut bytes_processed = resp.total_bytes_processed.clone();
        loop {
            if !resp.job_complete {
                resp = self.get_results(require_job(&resp)?, None)?;
                if bytes_processed.is_none() {
                    bytes_processed = resp.total_bytes_processed.clone();
                }
                continue;
            }
            for row in &resp.rows {
                if let Some((month, commits)) = row_entry(row) {
                    totals.insert(month, commits);
                }
            }
            match resp.page_token.take() {
                Some(token) if !token.is_empty() => {
                    resp = self.get_results(require_job(&resp)?, Some(&token))?;
                }
                _ => break,
            }
        }

        if let Some(bytes) = bytes_processed.as_deref().and_then(|b| b.parse::<u64>().ok()) {
            info!("query complete: {:.1} GB scanned", bytes as f64 / 1e9);
        }
        info!("query returned {} month(s)", totals.len());
        Ok(totals)
    }

    fn get_results(&self, job: JobReference, page_token: Option<&str>) -> Result<QueryResponse> {
        let url = format!(
            "{}/projects/{}/queries/{}",
            self.endpoint, self.project, job.job_id
        );
        let mut req = self
            .agent
            .get(&url)
            .set("Authorization", &self.auth_header())
            .query("timeoutMs", &POLL_TIMEOUT_MS.to_string());
        if let Some(location) = &job.location {
            req = req.query("location", location);
        }
        if let Some(token) = page_token {
            req = req.query("pageToken", token);
        }
        self.call(req.call(), &url)
    }

    fn call(
        &self,
        outcome: std::result::Result<ureq::Response, ureq::Error>,
        url: &str,
    ) -> Result<QueryResponse> {
        let resp = outcome.map_err(|err| http_error(url, err))?;
        Ok(resp.into_json::<QueryResponse>()?)
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

fn require_job(resp: &QueryResponse) -> Result<JobReference> {
    resp.job_reference
        .clone()
        .ok_or_else(|| PulseError::HttpError("query response missing job reference".to_string()))
}

fn named_param(name: &str, value: &str) -> serde_json::Value {
    json!({
        "name": name,
        "parameterType": { "type": "STRING" },
        "parameterValue": { "value": value },
    })
}

fn http_error(url: &str, err: ureq::Error) -> PulseError {
    match err {
        ureq::Error::Status(code, resp) => {
            let detail = resp.into_string().unwrap_or_default();
            PulseError::HttpError(format!("{} returned status {}: {}", url, code, detail))
        }
        ureq::Error::Transport(err) => {
            PulseError::HttpError(format!("{} transport error: {}", url, err))
        }
    }
}

/// Bearer token for the REST calls: `GOOGLE_OAUTH_ACCESS_TOKEN` when set,
/// otherwise the local gcloud credential helper.
fn access_token() -> Result<String> {
    if let Ok(token) = std::env::var("GOOGLE_OAUTH_ACCESS_TOKEN") {
        let token = token.trim().to_string();
        if !token.is_empty() {
            return Ok(token);
        }
    }
    let output = Command::new("gcloud")
        .args(["auth", "print-access-token"])
        .output()
        .map_err(|err| PulseError::CommandError(format!("failed to run gcloud: {}", err)))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PulseError::CommandError(format!(
            "gcloud auth print-access-token failed: {}",
            stderr.trim()
        )));
    }
    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        return Err(PulseError::CommandError(
            "gcloud returned an empty access token".to_string(),
        ));
    }
    Ok(token)
}

/// Overwrite-by-key merge: a re-fetched month replaces any cached total,
/// never sums into it.
pub fn merge_totals(cache: &mut MonthlyTotals, fetched: MonthlyTotals) {
    for (month, commits) in fetched {
        cache.insert(month, commits);
    }
}

/// Minimal contiguous span covering the requested months absent from the
/// cache, or `None` when the cache already has them all. The table-suffix
/// filter cannot express disjoint subsets, so cached months inside the span
/// are re-fetched and overwritten on merge.
pub fn missing_span(cache: &MonthlyTotals, start: Month, end: Month) -> Option<(Month, Month)> {
    let missing: Vec<Month> = months_between(start, end)
        .into_iter()
        .filter(|month| !cache.contains_key(month))
        .collect();
    match (missing.first(), missing.last()) {
        (Some(first), Some(last)) => Some((*first, *last)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn month(text: &str) -> Month {
        text.parse().unwrap()
    }

    #[test]
    fn merge_overwrites_instead_of_summing() {
        let mut cache = MonthlyTotals::new();
        cache.insert(month("2023-01"), 100);
        cache.insert(month("2023-02"), 200);

        let mut fetched = MonthlyTotals::new();
        fetched.insert(month("2023-02"), 999);
        fetched.insert(month("2023-03"), 300);

        merge_totals(&mut cache, fetched);
        assert_eq!(cache[&month("2023-01")], 100);
        assert_eq!(cache[&month("2023-02")], 999);
        assert_eq!(cache[&month("2023-03")], 300);
    }

    #[test]
    fn missing_span_is_none_when_cache_is_complete() {
        let mut cache = MonthlyTotals::new();
        for m in months_between(month("2023-01"), month("2023-06")) {
            cache.insert(m, 1);
        }
        assert_eq!(missing_span(&cache, month("2023-01"), month("2023-06")), None);
    }

    #[test]
    fn missing_span_covers_cached_months_inside_it() {
        let mut cache = MonthlyTotals::new();
        cache.insert(month("2023-01"), 1);
        cache.insert(month("2023-03"), 1);
        cache.insert(month("2023-06"), 1);

        // 2023-02 and 2023-04/05 are missing; the minimal contiguous span
        // runs 2023-02..2023-05 and re-covers cached 2023-03.
        let span = missing_span(&cache, month("2023-01"), month("2023-06"));
        assert_eq!(span, Some((month("2023-02"), month("2023-05"))));
    }

    #[test]
    fn missing_span_of_empty_cache_is_the_full_range() {
        let cache = MonthlyTotals::new();
        let span = missing_span(&cache, month("2023-01"), month("2023-03"));
        assert_eq!(span, Some((month("2023-01"), month("2023-03"))));
    }

    #[test]
    fn response_rows_parse_and_null_aggregates_are_omitted() {
        let raw = r#"{
            "jobReference": {"jobId": "job_abc", "location": "US"},
            "jobComplete": true,
            "totalBytesProcessed": "1234567890",
            "rows": [
                {"f": [{"v": "2023-01"}, {"v": "170000000"}]},
                {"f": [{"v": "2023-02"}, {"v": null}]},
                {"f": [{"v": "2023-03"}, {"v": "180000000"}]}
            ]
        }"#;
        let resp: QueryResponse = serde_json::from_str(raw).unwrap();
        assert!(resp.job_complete);
        assert_eq!(resp.job_reference.unwrap().job_id, "job_abc");

        let entries: Vec<(Month, u64)> = resp.rows.iter().filter_map(row_entry).collect();
        assert_eq!(
            entries,
            [
                (month("2023-01"), 170_000_000),
                (month("2023-03"), 180_000_000)
            ]
        );
    }

    #[test]
    fn incomplete_response_parses_without_rows() {
        let raw = r#"{"jobReference": {"jobId": "job_abc"}, "jobComplete": false}"#;
        let resp: QueryResponse = serde_json::from_str(raw).unwrap();
        assert!(!resp.job_complete);
        assert!(resp.rows.is_empty());
        assert!(resp.page_token.is_none());
    }
}

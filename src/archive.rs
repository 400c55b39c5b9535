use std::collections::BTreeSet;
use std::io::Read;
use std::thread;
use std::time::Duration;

use chrono::NaiveDate;
use flate2::read::GzDecoder;
use log::{info, warn};

use crate::error::{PulseError, Result};
use crate::models::{Month, MonthlyTotals, RawEvent};
use crate::retry::RetryPolicy;
use crate::store::Store;

const ARCHIVE_URL: &str = "https://data.gharchive.org";
const HOURS_PER_DAY: u32 = 24;

/// Outcome of fetching one hourly archive file.
pub enum Hour {
    /// Compressed newline-delimited JSON body.
    Body(Vec<u8>),
    /// The archive has no file for this hour. Normal past the coverage edge.
    Missing,
}

pub trait HourSource {
    fn fetch_hour(&self, day: NaiveDate, hour: u32) -> Result<Hour>;
}

/// Blocking client for the hourly archive files, one request at a time.
pub struct ArchiveClient {
    agent: ureq::Agent,
    base_url: String,
}

impl ArchiveClient {
    pub fn new() -> Self {
        Self::with_base_url(ARCHIVE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .timeout_read(Duration::from_secs(120))
            .build();
        ArchiveClient {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl Default for ArchiveClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HourSource for ArchiveClient {
    fn fetch_hour(&self, day: NaiveDate, hour: u32) -> Result<Hour> {
        // Hour carries no leading zero in the archive naming scheme.
        let url = format!("{}/{}-{}.json.gz", self.base_url, day.format("%Y-%m-%d"), hour);
        let resp = match self.agent.get(&url).call() {
            Ok(resp) => resp,
            Err(ureq::Error::Status(404, _)) => return Ok(Hour::Missing),
            Err(ureq::Error::Status(code, _)) => {
                return Err(PulseError::HttpError(format!(
                    "{} returned status {}",
                    url, code
                )))
            }
            Err(ureq::Error::Transport(err)) => {
                return Err(PulseError::HttpError(format!(
                    "{} transport error: {}",
                    url, err
                )))
            }
        };
        let mut body = Vec::new();
        resp.into_reader().read_to_end(&mut body)?;
        Ok(Hour::Body(body))
    }
}

/// Count commits in one hour of newline-delimited archive events.
///
/// Each line is parsed independently; lines that fail to parse are skipped.
/// Only `PushEvent` records with a positive `payload.size` contribute.
pub fn count_push_commits(text: &str) -> u64 {
    let mut commits = 0u64;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let event: RawEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(_) => continue,
        };
        if event.kind.as_deref() != Some("PushEvent") {
            continue;
        }
        if let Some(size) = event.payload.size {
            if size > 0 {
                commits += size as u64;
            }
        }
    }
    commits
}

fn count_hour(body: &[u8]) -> Result<u64> {
    let mut gz = GzDecoder::new(body);
    let mut raw = Vec::new();
    gz.read_to_end(&mut raw)?;
    let text = String::from_utf8_lossy(&raw);
    Ok(count_push_commits(&text))
}

/// Fetch and count one hour, retrying transient failures per the policy.
/// Exhausted retries degrade the hour to zero; the surrounding day still
/// completes, trading accuracy for termination.
fn fetch_hour_with_retry<S: HourSource + ?Sized>(
    source: &S,
    policy: &RetryPolicy,
    day: NaiveDate,
    hour: u32,
) -> u64 {
    let mut attempt = 1;
    loop {
        let outcome = source.fetch_hour(day, hour).and_then(|fetched| match fetched {
            Hour::Missing => Ok(0),
            Hour::Body(body) => count_hour(&body),
        });
        match outcome {
            Ok(commits) => return commits,
            Err(err) => match policy.backoff(attempt) {
                Some(delay) => {
                    warn!(
                        "{} hour {}: attempt {} failed ({}); retrying in {:?}",
                        day, hour, attempt, err, delay
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                None => {
                    warn!(
                        "{} hour {}: giving up after {} attempt(s) ({}); counting zero",
                        day, hour, attempt, err
                    );
                    return 0;
                }
            },
        }
    }
}

/// Fetch all 24 hourly files for one day and return the day's commit total.
/// The month mapping is owned by the caller's loop, not by this function.
pub fn process_day<S: HourSource + ?Sized>(
    source: &S,
    policy: &RetryPolicy,
    day: NaiveDate,
) -> u64 {
    let mut commits = 0u64;
    for hour in 0..HOURS_PER_DAY {
        commits += fetch_hour_with_retry(source, policy, day, hour);
    }
    commits
}

/// Every date from `start` to `end` inclusive, ascending.
pub fn date_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut days = Vec::new();
    let mut current = start;
    while current <= end {
        days.push(current);
        match current.succ_opt() {
            Some(next) => current = next,
            None => break,
        }
    }
    days
}

/// Day-by-day scan over an inclusive date range, resuming from the
/// checkpoint. Both the cache and the checkpoint are committed after every
/// day, so an interrupted run redoes at most one day.
pub struct Scanner<'a, S: ?Sized> {
    source: &'a S,
    store: &'a Store,
    policy: RetryPolicy,
}

impl<'a, S: HourSource + ?Sized> Scanner<'a, S> {
    pub fn new(source: &'a S, store: &'a Store) -> Self {
        Scanner {
            source,
            store,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(source: &'a S, store: &'a Store, policy: RetryPolicy) -> Self {
        Scanner {
            source,
            store,
            policy,
        }
    }

    /// Cover `start..=end`. Checkpointed days are skipped unless `force`,
    /// which ignores the prior checkpoint entirely and rebuilds it from the
    /// days processed in this run.
    pub fn run(&self, start: NaiveDate, end: NaiveDate, force: bool) -> Result<MonthlyTotals> {
        let mut done = if force {
            BTreeSet::new()
        } else {
            self.store.load_checkpoint()?
        };
        let mut totals = self.store.load_totals()?;

        let pending: Vec<NaiveDate> = date_range(start, end)
            .into_iter()
            .filter(|day| !done.contains(day))
            .collect();
        if pending.is_empty() {
            info!(
                "all days between {} and {} already processed (use --force to redo)",
                start, end
            );
            return Ok(totals);
        }

        info!(
            "fetching {} day(s) of archive data ({} -> {})",
            pending.len(),
            start,
            end
        );

        for day in pending {
            let day_commits = process_day(self.source, &self.policy, day);
            let month = Month::of(day);
            let month_total = {
                let entry = totals.entry(month).or_insert(0);
                *entry += day_commits;
                *entry
            };
            done.insert(day);
            self.store.commit_day(&totals, &done)?;
            info!(
                "{}: {} commits ({} total for {})",
                day, day_commits, month_total, month
            );
        }

        Ok(totals)
    }
}

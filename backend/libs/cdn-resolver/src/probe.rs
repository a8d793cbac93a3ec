//! Origin reachability checks.
//!
//! [`NetworkProbe`] is the host-supplied fetch primitive; [`HealthProber`]
//! bounds each check in time and fans a resolution out over all candidate
//! origins at once.

use crate::config::SelectionPolicy;
use crate::error::ProbeError;
use crate::metrics;
use crate::registry::Origin;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use reqwest::header::RANGE;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Minimal existence check against a URL.
///
/// Dropping the returned future must abandon the request.
#[async_trait]
pub trait NetworkProbe: Send + Sync {
    /// Returns the measured latency when the URL answered with a 2xx status
    async fn check(&self, url: &str) -> Result<Duration, ProbeError>;
}

/// reqwest-backed probe: `HEAD`, retried as a one-byte ranged `GET` when the
/// origin does not allow `HEAD`.
#[derive(Debug, Clone, Default)]
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NetworkProbe for HttpProbe {
    async fn check(&self, url: &str) -> Result<Duration, ProbeError> {
        let started = std::time::Instant::now();

        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| ProbeError::network(e.to_string()))?;

        let status = if response.status() == StatusCode::METHOD_NOT_ALLOWED {
            self.client
                .get(url)
                .header(RANGE, "bytes=0-0")
                .send()
                .await
                .map_err(|e| ProbeError::network(e.to_string()))?
                .status()
        } else {
            response.status()
        };

        if status.is_success() {
            Ok(started.elapsed())
        } else {
            Err(ProbeError::Status(status.as_u16()))
        }
    }
}

/// Outcome of probing one origin at one point in time
#[derive(Debug, Clone)]
pub struct HealthRecord {
    pub origin: Origin,
    pub healthy: bool,
    /// Monotonic timestamp, used for ordering and TTL math
    pub checked_at: Instant,
    /// Wall-clock timestamp for reporting
    pub observed_at: DateTime<Utc>,
    pub latency: Option<Duration>,
    pub error: Option<ProbeError>,
}

impl HealthRecord {
    pub fn healthy(origin: Origin, latency: Duration) -> Self {
        Self {
            origin,
            healthy: true,
            checked_at: Instant::now(),
            observed_at: Utc::now(),
            latency: Some(latency),
            error: None,
        }
    }

    pub fn unhealthy(origin: Origin, error: ProbeError) -> Self {
        Self {
            origin,
            healthy: false,
            checked_at: Instant::now(),
            observed_at: Utc::now(),
            latency: None,
            error: Some(error),
        }
    }
}

/// Result of racing every candidate origin of one resolution
#[derive(Debug, Clone, Default)]
pub struct RaceOutcome {
    /// Record of the selected origin
    pub winner: Option<HealthRecord>,
    /// Records for every probe that finished or was abandoned at the ceiling.
    /// Probes cancelled after a winner was picked leave no record.
    pub records: Vec<HealthRecord>,
}

/// Bounded-time health checks over a [`NetworkProbe`]
#[derive(Clone)]
pub struct HealthProber {
    probe: Arc<dyn NetworkProbe>,
    timeout: Duration,
}

impl HealthProber {
    pub fn new(probe: Arc<dyn NetworkProbe>, timeout: Duration) -> Self {
        Self { probe, timeout }
    }

    /// Per-origin timeout used by [`race`](Self::race)
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Check `resource_path` on `origin`, giving up after `timeout`
    pub async fn probe(
        &self,
        origin: &Origin,
        resource_path: &str,
        timeout: Duration,
    ) -> HealthRecord {
        let url = origin.url_for(resource_path);

        let record = match tokio::time::timeout(timeout, self.probe.check(&url)).await {
            Ok(Ok(latency)) => HealthRecord::healthy(origin.clone(), latency),
            Ok(Err(e)) => HealthRecord::unhealthy(origin.clone(), e),
            Err(_) => HealthRecord::unhealthy(origin.clone(), ProbeError::Timeout(timeout)),
        };

        debug!(
            provider = %origin.provider,
            url = %url,
            healthy = record.healthy,
            latency_ms = record.latency.map(|l| l.as_millis() as u64),
            error = record.error.as_ref().map(|e| e.to_string()),
            "Origin probed"
        );
        metrics::record_probe(&origin.provider, record.healthy);

        record
    }

    /// Probe every candidate concurrently and pick a winner under `policy`.
    ///
    /// Returns as soon as the winner is known; outstanding probes are
    /// dropped. If `ceiling` elapses first, the best healthy result seen so
    /// far wins and still-pending origins are recorded as timed out.
    pub async fn race(
        &self,
        resource_path: &str,
        candidates: &[Origin],
        ceiling: Duration,
        policy: SelectionPolicy,
    ) -> RaceOutcome {
        if candidates.is_empty() {
            return RaceOutcome::default();
        }

        let mut pending: FuturesUnordered<_> = candidates
            .iter()
            .enumerate()
            .map(|(priority, origin)| async move {
                (priority, self.probe(origin, resource_path, self.timeout).await)
            })
            .collect();

        let mut results: Vec<Option<HealthRecord>> = vec![None; candidates.len()];
        let deadline = tokio::time::sleep(ceiling);
        tokio::pin!(deadline);

        let winner = loop {
            tokio::select! {
                next = pending.next() => match next {
                    Some((priority, record)) => {
                        let healthy = record.healthy;
                        results[priority] = Some(record);

                        let decided = match policy {
                            SelectionPolicy::FirstHealthy => healthy.then_some(priority),
                            SelectionPolicy::PriorityFirst => settled_priority_winner(&results),
                        };
                        if decided.is_some() {
                            break decided;
                        }
                    }
                    None => break best_healthy(&results),
                },
                _ = &mut deadline => {
                    debug!(
                        ceiling_ms = ceiling.as_millis() as u64,
                        pending = pending.len(),
                        "Resolution ceiling reached"
                    );
                    let best = best_healthy(&results);
                    for (priority, slot) in results.iter_mut().enumerate() {
                        if slot.is_none() {
                            *slot = Some(HealthRecord::unhealthy(
                                candidates[priority].clone(),
                                ProbeError::Timeout(ceiling),
                            ));
                        }
                    }
                    break best;
                }
            }
        };

        drop(pending);

        let winner = winner.and_then(|priority| results[priority].clone());
        RaceOutcome {
            winner,
            records: results.into_iter().flatten().collect(),
        }
    }
}

/// Highest-priority healthy result, once every higher-priority probe is known
/// to be unhealthy. `None` while a higher-priority probe is still pending.
fn settled_priority_winner(results: &[Option<HealthRecord>]) -> Option<usize> {
    for (priority, slot) in results.iter().enumerate() {
        match slot {
            None => return None,
            Some(record) if record.healthy => return Some(priority),
            Some(_) => continue,
        }
    }
    None
}

fn best_healthy(results: &[Option<HealthRecord>]) -> Option<usize> {
    results
        .iter()
        .position(|slot| slot.as_ref().is_some_and(|record| record.healthy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProbe;
    use mockall::mock;

    mock! {
        pub Network {}

        #[async_trait]
        impl NetworkProbe for Network {
            async fn check(&self, url: &str) -> Result<Duration, ProbeError>;
        }
    }

    const CDN_A: &str = "https://a.example-cdn.net/site";
    const CDN_B: &str = "https://b.example-cdn.net/site";
    const CDN_C: &str = "https://c.example-cdn.net/site";

    fn candidates() -> Vec<Origin> {
        vec![
            Origin::new("cdn-a", CDN_A),
            Origin::new("cdn-b", CDN_B),
            Origin::new("cdn-c", CDN_C),
        ]
    }

    fn assert_elapsed(started: Instant, expected_ms: u64) {
        let elapsed = started.elapsed();
        assert!(
            elapsed >= Duration::from_millis(expected_ms)
                && elapsed < Duration::from_millis(expected_ms + 10),
            "expected ~{}ms, took {:?}",
            expected_ms,
            elapsed
        );
    }

    fn prober(probe: ScriptedProbe, timeout_ms: u64) -> HealthProber {
        HealthProber::new(Arc::new(probe), Duration::from_millis(timeout_ms))
    }

    #[tokio::test]
    async fn test_probe_builds_url_from_origin() {
        let mut network = MockNetwork::new();
        network
            .expect_check()
            .withf(|url| url == "https://a.example-cdn.net/site/images/avatar.webp")
            .times(1)
            .returning(|_| Ok(Duration::from_millis(12)));

        let prober = HealthProber::new(Arc::new(network), Duration::from_secs(1));
        let record = prober
            .probe(
                &Origin::new("cdn-a", CDN_A),
                "images/avatar.webp",
                Duration::from_secs(1),
            )
            .await;

        assert!(record.healthy);
        assert_eq!(record.latency, Some(Duration::from_millis(12)));
        assert!(record.error.is_none());
    }

    #[tokio::test]
    async fn test_probe_failure_is_absorbed() {
        let mut network = MockNetwork::new();
        network
            .expect_check()
            .times(1)
            .returning(|_| Err(ProbeError::Status(404)));

        let prober = HealthProber::new(Arc::new(network), Duration::from_secs(1));
        let record = prober
            .probe(&Origin::new("cdn-a", CDN_A), "avatar", Duration::from_secs(1))
            .await;

        assert!(!record.healthy);
        assert_eq!(record.error, Some(ProbeError::Status(404)));
        assert!(record.latency.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_timeout() {
        let prober = prober(ScriptedProbe::new().hanging(CDN_A), 500);
        let started = Instant::now();

        let record = prober
            .probe(&Origin::new("cdn-a", CDN_A), "avatar", Duration::from_millis(500))
            .await;

        assert!(!record.healthy);
        assert_eq!(
            record.error,
            Some(ProbeError::Timeout(Duration::from_millis(500)))
        );
        assert_elapsed(started, 500);
    }

    #[tokio::test(start_paused = true)]
    async fn test_race_priority_first_waits_for_higher_priority() {
        let prober = prober(
            ScriptedProbe::new()
                .healthy_after(CDN_A, Duration::from_millis(500))
                .healthy_after(CDN_B, Duration::from_millis(50))
                .healthy_after(CDN_C, Duration::from_millis(10)),
            2000,
        );
        let started = Instant::now();

        let outcome = prober
            .race(
                "avatar",
                &candidates(),
                Duration::from_secs(3),
                SelectionPolicy::PriorityFirst,
            )
            .await;

        assert_eq!(outcome.winner.unwrap().origin.provider, "cdn-a");
        assert_elapsed(started, 500);
        assert_eq!(outcome.records.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_race_priority_first_skips_failed_higher_priority() {
        let prober = prober(
            ScriptedProbe::new()
                .failing_after(CDN_A, Duration::from_millis(100))
                .healthy_after(CDN_B, Duration::from_millis(300))
                .healthy_after(CDN_C, Duration::from_millis(10)),
            2000,
        );
        let started = Instant::now();

        let outcome = prober
            .race(
                "avatar",
                &candidates(),
                Duration::from_secs(3),
                SelectionPolicy::PriorityFirst,
            )
            .await;

        assert_eq!(outcome.winner.unwrap().origin.provider, "cdn-b");
        assert_elapsed(started, 300);
    }

    #[tokio::test(start_paused = true)]
    async fn test_race_first_healthy_takes_fastest() {
        let prober = prober(
            ScriptedProbe::new()
                .healthy_after(CDN_A, Duration::from_millis(500))
                .healthy_after(CDN_B, Duration::from_millis(50))
                .failing_after(CDN_C, Duration::from_millis(10)),
            2000,
        );
        let started = Instant::now();

        let outcome = prober
            .race(
                "avatar",
                &candidates(),
                Duration::from_secs(3),
                SelectionPolicy::FirstHealthy,
            )
            .await;

        assert_eq!(outcome.winner.unwrap().origin.provider, "cdn-b");
        assert_elapsed(started, 50);
        // cdn-a was still in flight and was abandoned without a record
        assert_eq!(outcome.records.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_race_ceiling_takes_best_seen_and_times_out_pending() {
        let prober = prober(
            ScriptedProbe::new()
                .hanging(CDN_A)
                .healthy_after(CDN_B, Duration::from_millis(50))
                .hanging(CDN_C),
            5000,
        );
        let started = Instant::now();

        let outcome = prober
            .race(
                "avatar",
                &candidates(),
                Duration::from_secs(1),
                SelectionPolicy::PriorityFirst,
            )
            .await;

        assert_eq!(outcome.winner.unwrap().origin.provider, "cdn-b");
        assert_elapsed(started, 1000);
        assert_eq!(outcome.records.len(), 3);
        let timed_out = outcome
            .records
            .iter()
            .filter(|r| r.error == Some(ProbeError::Timeout(Duration::from_secs(1))))
            .count();
        assert_eq!(timed_out, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_race_all_failing() {
        let prober = prober(
            ScriptedProbe::new()
                .failing_after(CDN_A, Duration::from_millis(20))
                .failing_after(CDN_B, Duration::from_millis(40))
                .hanging(CDN_C),
            300,
        );

        let outcome = prober
            .race(
                "avatar",
                &candidates(),
                Duration::from_secs(2),
                SelectionPolicy::PriorityFirst,
            )
            .await;

        assert!(outcome.winner.is_none());
        assert_eq!(outcome.records.len(), 3);
        assert!(outcome.records.iter().all(|r| !r.healthy));
    }

    #[tokio::test]
    async fn test_race_without_candidates() {
        let prober = prober(ScriptedProbe::new(), 100);
        let outcome = prober
            .race(
                "avatar",
                &[],
                Duration::from_secs(1),
                SelectionPolicy::PriorityFirst,
            )
            .await;
        assert!(outcome.winner.is_none());
        assert!(outcome.records.is_empty());
    }

    // ==================== HttpProbe ====================

    mod http {
        use super::*;
        use wiremock::matchers::{header, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        #[tokio::test]
        async fn test_head_success() {
            let server = MockServer::start().await;
            Mock::given(method("HEAD"))
                .and(path("/site/avatar.webp"))
                .respond_with(ResponseTemplate::new(200))
                .expect(1)
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(200))
                .expect(0)
                .mount(&server)
                .await;

            let url = format!("{}/site/avatar.webp", server.uri());
            assert!(HttpProbe::new().check(&url).await.is_ok());
        }

        #[tokio::test]
        async fn test_head_not_allowed_retries_ranged_get() {
            let server = MockServer::start().await;
            Mock::given(method("HEAD"))
                .respond_with(ResponseTemplate::new(405))
                .expect(1)
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/site/avatar.webp"))
                .and(header("range", "bytes=0-0"))
                .respond_with(ResponseTemplate::new(206).set_body_bytes(vec![0u8]))
                .expect(1)
                .mount(&server)
                .await;

            let url = format!("{}/site/avatar.webp", server.uri());
            assert!(HttpProbe::new().check(&url).await.is_ok());
        }

        #[tokio::test]
        async fn test_ranged_get_failure_reports_its_status() {
            let server = MockServer::start().await;
            Mock::given(method("HEAD"))
                .respond_with(ResponseTemplate::new(405))
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(503))
                .mount(&server)
                .await;

            let url = format!("{}/avatar", server.uri());
            assert_eq!(
                HttpProbe::new().check(&url).await,
                Err(ProbeError::Status(503))
            );
        }

        #[tokio::test]
        async fn test_missing_resource_is_status_error() {
            let server = MockServer::start().await;
            Mock::given(method("HEAD"))
                .respond_with(ResponseTemplate::new(404))
                .mount(&server)
                .await;

            let url = format!("{}/avatar", server.uri());
            assert_eq!(
                HttpProbe::new().check(&url).await,
                Err(ProbeError::Status(404))
            );
        }
    }
}

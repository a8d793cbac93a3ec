//! In-memory [`NetworkProbe`] for tests and offline runs.
//!
//! Behaviours are matched by URL prefix in the order they were scripted.
//! Delays use `tokio::time`, so tests may run with a paused clock.

use crate::error::ProbeError;
use crate::probe::NetworkProbe;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum ProbeBehavior {
    /// Answer 2xx after `delay`
    Healthy(Duration),
    /// Fail with `error` after `delay`
    Fail(Duration, ProbeError),
    /// Never answer
    Hang,
}

#[derive(Debug, Default)]
pub struct ScriptedProbe {
    scripts: Vec<(String, ProbeBehavior)>,
    calls: AtomicUsize,
    log: Mutex<Vec<String>>,
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the answer for every URL starting with `prefix`
    pub fn on(mut self, prefix: impl Into<String>, behavior: ProbeBehavior) -> Self {
        self.scripts.push((prefix.into(), behavior));
        self
    }

    pub fn healthy_after(self, prefix: impl Into<String>, delay: Duration) -> Self {
        self.on(prefix, ProbeBehavior::Healthy(delay))
    }

    pub fn failing_after(self, prefix: impl Into<String>, delay: Duration) -> Self {
        self.on(
            prefix,
            ProbeBehavior::Fail(delay, ProbeError::network("connection refused")),
        )
    }

    pub fn hanging(self, prefix: impl Into<String>) -> Self {
        self.on(prefix, ProbeBehavior::Hang)
    }

    /// Total number of checks issued
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of checks issued against URLs starting with `prefix`
    pub fn calls_for(&self, prefix: &str) -> usize {
        match self.log.lock() {
            Ok(log) => log.iter().filter(|url| url.starts_with(prefix)).count(),
            Err(_) => 0,
        }
    }

    fn behavior_for(&self, url: &str) -> Option<ProbeBehavior> {
        self.scripts
            .iter()
            .find(|(prefix, _)| url.starts_with(prefix.as_str()))
            .map(|(_, behavior)| behavior.clone())
    }
}

#[async_trait]
impl NetworkProbe for ScriptedProbe {
    async fn check(&self, url: &str) -> Result<Duration, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut log) = self.log.lock() {
            log.push(url.to_string());
        }

        match self.behavior_for(url) {
            Some(ProbeBehavior::Healthy(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(delay)
            }
            Some(ProbeBehavior::Fail(delay, error)) => {
                tokio::time::sleep(delay).await;
                Err(error)
            }
            Some(ProbeBehavior::Hang) => std::future::pending().await,
            None => Err(ProbeError::network(format!("no script for {}", url))),
        }
    }
}

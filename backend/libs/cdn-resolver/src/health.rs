//! Latest health record per (resource, origin) and the aggregate view derived from them

use crate::error::ProbeError;
use crate::probe::HealthRecord;
use crate::registry::Origin;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

/// Whole-system CDN reachability, for status displays
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateHealth {
    /// True while any remote origin is known reachable, or nothing was probed yet
    pub any_reachable: bool,
    /// Resources whose every probed remote origin is unhealthy
    pub degraded_resources: BTreeSet<String>,
}

/// Most recent [`HealthRecord`] per (resource id, provider).
///
/// Records are overwritten, never appended; an older record never replaces a
/// newer one.
#[derive(Debug, Default)]
pub struct HealthTable {
    records: DashMap<(String, String), HealthRecord>,
}

impl HealthTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `record` unless a newer one is already present.
    ///
    /// Returns `true` when the record was stored.
    pub fn record(&self, resource_id: &str, record: HealthRecord) -> bool {
        let key = (resource_id.to_string(), record.origin.provider.clone());
        let mut stored = true;

        self.records
            .entry(key)
            .and_modify(|existing| {
                if record.checked_at >= existing.checked_at {
                    *existing = record.clone();
                } else {
                    stored = false;
                }
            })
            .or_insert_with(|| record.clone());

        if !stored {
            debug!(resource = %resource_id, "Ignoring out-of-date health record");
        }
        stored
    }

    pub fn record_all(&self, resource_id: &str, records: impl IntoIterator<Item = HealthRecord>) {
        for record in records {
            self.record(resource_id, record);
        }
    }

    /// Mark `origin` unhealthy for `resource_id` as of now
    pub fn mark_unhealthy(&self, resource_id: &str, origin: &Origin, error: ProbeError) {
        warn!(
            resource = %resource_id,
            provider = %origin.provider,
            error = %error,
            "Origin marked unhealthy"
        );
        self.record(resource_id, HealthRecord::unhealthy(origin.clone(), error));
    }

    pub fn get(&self, resource_id: &str, provider: &str) -> Option<HealthRecord> {
        self.records
            .get(&(resource_id.to_string(), provider.to_string()))
            .map(|record| record.clone())
    }

    pub fn records_for(&self, resource_id: &str) -> Vec<HealthRecord> {
        self.records
            .iter()
            .filter(|item| item.key().0 == resource_id)
            .map(|item| item.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Recompute the aggregate view from the current records
    pub fn aggregate(&self) -> AggregateHealth {
        if self.records.is_empty() {
            return AggregateHealth {
                any_reachable: true,
                degraded_resources: BTreeSet::new(),
            };
        }

        let mut healthy_by_resource: HashMap<String, bool> = HashMap::new();
        for item in self.records.iter() {
            let healthy = healthy_by_resource.entry(item.key().0.clone()).or_insert(false);
            *healthy |= item.value().healthy;
        }

        let any_reachable = healthy_by_resource.values().any(|healthy| *healthy);
        let degraded_resources = healthy_by_resource
            .into_iter()
            .filter(|(_, healthy)| !healthy)
            .map(|(id, _)| id)
            .collect();

        AggregateHealth {
            any_reachable,
            degraded_resources,
        }
    }
}

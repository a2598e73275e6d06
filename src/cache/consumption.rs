//! Consumption telemetry counter.
//!
//! Tracks how many tuples of each type were handed out, in fixed-width time
//! buckets on the shared cache. The counter is strictly advisory: it feeds
//! rate-based provisioning alarms and the telemetry report, and losing a
//! bucket to TTL expiry is never a correctness issue.

use crate::cache::store::KeyValueStore;
use crate::core::error::CastorResult;
use crate::core::time::{bucket_start, SharedClock};
use crate::store::FragmentStoreService;
use crate::tuples::TupleType;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Bucketed, per-tuple-type consumption counter.
pub struct ConsumptionCounter {
    store: Arc<dyn KeyValueStore>,
    prefix: String,
    bucket_width_ms: u64,
    retention: Duration,
}

impl ConsumptionCounter {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        prefix: &str,
        bucket_width_ms: u64,
        retention_ms: u64,
    ) -> Self {
        Self {
            store,
            prefix: prefix.to_string(),
            bucket_width_ms,
            retention: Duration::from_millis(retention_ms),
        }
    }

    fn type_prefix(&self, tuple_type: TupleType) -> String {
        format!("{}{}::", self.prefix, tuple_type)
    }

    fn key(&self, tuple_type: TupleType, bucket_start_ms: u64) -> String {
        format!("{}{}", self.type_prefix(tuple_type), bucket_start_ms)
    }

    /// Add `delta` consumed tuples to the bucket containing `timestamp_ms`.
    ///
    /// The bucket's TTL starts with its first write; the counter never
    /// decrements.
    pub fn record(
        &self,
        timestamp_ms: u64,
        tuple_type: TupleType,
        delta: u64,
    ) -> CastorResult<()> {
        if delta == 0 {
            return Ok(());
        }
        let bucket = bucket_start(timestamp_ms, self.bucket_width_ms);
        let total = self.store.increment_by(
            &self.key(tuple_type, bucket),
            delta,
            Some(self.retention),
        )?;
        tracing::debug!(%tuple_type, bucket, delta, total, "consumption recorded");
        Ok(())
    }

    /// Sum of all retained buckets starting at or after `from_ms`.
    ///
    /// Pass `from_ms == 0` to sum the entire retained window.
    pub fn sum_since(&self, tuple_type: TupleType, from_ms: u64) -> CastorResult<u64> {
        let prefix = self.type_prefix(tuple_type);
        let mut total = 0u64;
        for (key, value) in self.store.scan_prefix(&prefix) {
            let Ok(bucket) = key[prefix.len()..].parse::<u64>() else {
                continue;
            };
            if bucket < from_ms {
                continue;
            }
            if let Ok(count) = std::str::from_utf8(&value).unwrap_or("").parse::<u64>() {
                total += count;
            }
        }
        Ok(total)
    }
}

/// Availability and consumption of one tuple type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryMetric {
    pub tuple_type: TupleType,
    /// Tuples currently available for reservation.
    pub available: u64,
    /// Tuples consumed within the report interval.
    pub consumed: u64,
}

/// Point-in-time view over every tuple type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryReport {
    /// Interval the `consumed` counts cover, in milliseconds.
    pub interval_ms: u64,
    pub metrics: Vec<TelemetryMetric>,
}

/// Read-only telemetry view combining the counter with the fragment store.
pub struct TelemetryService {
    counter: Arc<ConsumptionCounter>,
    fragments: Arc<FragmentStoreService>,
    clock: SharedClock,
    interval_ms: u64,
}

impl TelemetryService {
    pub fn new(
        counter: Arc<ConsumptionCounter>,
        fragments: Arc<FragmentStoreService>,
        clock: SharedClock,
        interval_ms: u64,
    ) -> Self {
        Self {
            counter,
            fragments,
            clock,
            interval_ms,
        }
    }

    /// Per-type availability and recent consumption over the configured
    /// interval (or `interval_ms` when given).
    pub fn report(&self, interval_ms: Option<u64>) -> CastorResult<TelemetryReport> {
        let interval_ms = interval_ms.unwrap_or(self.interval_ms);
        let from_ms = self.clock.now_ms().saturating_sub(interval_ms);
        let mut metrics = Vec::with_capacity(TupleType::ALL.len());
        for tuple_type in TupleType::ALL {
            metrics.push(TelemetryMetric {
                tuple_type,
                available: self.fragments.available_tuple_count(tuple_type),
                consumed: self.counter.sum_since(tuple_type, from_ms)?,
            });
        }
        Ok(TelemetryReport {
            interval_ms,
            metrics,
        })
    }
}

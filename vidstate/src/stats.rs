use crate::cache::TtlCache;
use crate::clock::SharedClock;
use crate::domain::StateStats;
use crate::masking::MaskingProxy;
use crate::processing::ProcessingTracker;
use std::sync::Arc;
use std::time::Instant;

/// Read-only view over the three stores, for operational visibility.
pub struct StatsAggregator<V> {
    cache: Arc<TtlCache<V>>,
    masking: Arc<MaskingProxy>,
    tracker: Arc<ProcessingTracker>,
    clock: SharedClock,
    started_at: Instant,
}

impl<V> StatsAggregator<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(
        cache: Arc<TtlCache<V>>,
        masking: Arc<MaskingProxy>,
        tracker: Arc<ProcessingTracker>,
        clock: SharedClock,
    ) -> Self {
        let started_at = clock.now();
        Self {
            cache,
            masking,
            tracker,
            clock,
            started_at,
        }
    }

    pub async fn snapshot(&self) -> StateStats {
        StateStats {
            uptime_secs: self
                .clock
                .now()
                .saturating_duration_since(self.started_at)
                .as_secs(),
            cache: self.cache.stats(),
            masking: self.masking.stats(),
            processing_active: self.tracker.active_count().await,
        }
    }
}

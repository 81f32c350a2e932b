//! The aggregation engine and its compute loop

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use metro_events::RelayCounters;
use metro_protocol::{Datapoint, MetricName, QueueEntry};
use metro_routing::AggregateResolver;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::buffer::BufferManager;
use crate::rules::RuleSet;
use crate::Result;

/// Default pacing of the compute scan
///
/// Each scan emits only the buffers whose own frequency deadline has
/// passed, so a 1s scan never emits faster than the rules ask for.
const DEFAULT_COMPUTE_INTERVAL: Duration = Duration::from_secs(1);

/// Tuning knobs for [`AggregationEngine`]
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Path to the aggregation-rules file
    pub rules_path: PathBuf,

    /// Buckets of history retained per buffer, in multiples of frequency
    pub max_retained_intervals: u32,

    /// How often to re-stat the rules file for changes
    pub reload_interval: Duration,

    /// How often the compute scan wakes up
    pub compute_interval: Duration,
}

impl EngineSettings {
    /// Settings with default pacing for a rules file
    pub fn new(rules_path: impl Into<PathBuf>) -> Self {
        Self {
            rules_path: rules_path.into(),
            max_retained_intervals: 5,
            reload_interval: Duration::from_secs(60),
            compute_interval: DEFAULT_COMPUTE_INTERVAL,
        }
    }
}

/// Reload-aware handle to the live rule set
///
/// Cheap to clone; every clone observes rule reloads immediately. Handed
/// to the aggregating hash router so routing and aggregation always agree
/// on which outputs a metric produces.
#[derive(Clone)]
pub struct SharedRules {
    inner: Arc<RwLock<Arc<RuleSet>>>,
}

impl SharedRules {
    fn new(rules: RuleSet) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(rules))),
        }
    }

    /// The current rule set
    pub fn current(&self) -> Arc<RuleSet> {
        Arc::clone(&self.inner.read())
    }

    fn replace(&self, rules: RuleSet) {
        *self.inner.write() = Arc::new(rules);
    }
}

impl AggregateResolver for SharedRules {
    fn resolve_outputs(&self, metric: &MetricName) -> Vec<MetricName> {
        self.current().resolve_outputs(metric)
    }
}

/// Buckets matching datapoints and emits time-windowed aggregates
///
/// `observe` is called synchronously from the dispatch path for every
/// datapoint; the async [`run`](Self::run) loop owns the compute schedule
/// and pushes emitted aggregates into the pipeline channel.
pub struct AggregationEngine {
    rules: SharedRules,
    rules_path: PathBuf,
    last_modified: Mutex<Option<SystemTime>>,
    buffers: Mutex<BufferManager>,
    counters: Arc<RelayCounters>,
    output: mpsc::Sender<QueueEntry>,
    settings: EngineSettings,
}

impl AggregationEngine {
    /// Load the rules file and build an engine emitting into `output`
    pub fn new(
        settings: EngineSettings,
        counters: Arc<RelayCounters>,
        output: mpsc::Sender<QueueEntry>,
    ) -> Result<Self> {
        let rules = RuleSet::from_file(&settings.rules_path)?;
        let modified = std::fs::metadata(&settings.rules_path)
            .and_then(|m| m.modified())
            .ok();

        info!(
            path = %settings.rules_path.display(),
            rules = rules.len(),
            "loaded aggregation rules"
        );

        Ok(Self {
            rules: SharedRules::new(rules),
            rules_path: settings.rules_path.clone(),
            last_modified: Mutex::new(modified),
            buffers: Mutex::new(BufferManager::new(settings.max_retained_intervals)),
            counters,
            output,
            settings,
        })
    }

    /// Handle to the live rule set, for the router
    pub fn rules_handle(&self) -> SharedRules {
        self.rules.clone()
    }

    /// Number of live output buffers
    pub fn buffer_count(&self) -> usize {
        self.buffers.lock().len()
    }

    /// Feed one datapoint through the rule set into its buffers
    ///
    /// Returns how many rules matched. The caller keeps routing the raw
    /// datapoint regardless; aggregation adds series, it never consumes
    /// them.
    pub fn observe(&self, metric: &MetricName, datapoint: Datapoint) -> usize {
        let rules = self.rules.current();
        let matches = rules.matches(metric);
        if matches.is_empty() {
            return 0;
        }

        let now = now_secs();
        let matched = matches.len();
        let mut buffers = self.buffers.lock();
        for (rule, output) in matches {
            buffers.observe(&rule, output, datapoint, now);
        }
        matched
    }

    /// Drive compute cycles and rule reloads until the pipeline closes
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.settings.compute_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut last_reload_check = tokio::time::Instant::now();

        loop {
            ticker.tick().await;

            if last_reload_check.elapsed() >= self.settings.reload_interval {
                last_reload_check = tokio::time::Instant::now();
                self.maybe_reload();
            }

            let entries = self.buffers.lock().compute_due(now_secs());
            if entries.is_empty() {
                continue;
            }

            debug!(emitted = entries.len(), "aggregation compute cycle");
            for entry in entries {
                self.counters.record_generated();
                if self.output.send(entry).await.is_err() {
                    info!("aggregate output channel closed, stopping engine");
                    return;
                }
            }
        }
    }

    /// Re-stat the rules file and swap the rule set if it changed
    ///
    /// A reload drops every live buffer: old buffered values may not be
    /// meaningful under the new rules, so they are discarded rather than
    /// emitted under possibly stale output names. A failed parse keeps the
    /// old rules in place.
    pub(crate) fn maybe_reload(&self) {
        let modified = match std::fs::metadata(&self.rules_path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                warn!(path = %self.rules_path.display(), error = %e, "cannot stat rules file");
                return;
            }
        };

        {
            let last = self.last_modified.lock();
            if *last == Some(modified) {
                return;
            }
        }

        match RuleSet::from_file(&self.rules_path) {
            Ok(rules) => {
                let dropped = {
                    let mut buffers = self.buffers.lock();
                    let dropped = buffers.len();
                    buffers.clear();
                    dropped
                };
                info!(
                    path = %self.rules_path.display(),
                    rules = rules.len(),
                    dropped_buffers = dropped,
                    "reloaded aggregation rules"
                );
                self.rules.replace(rules);
                *self.last_modified.lock() = Some(modified);
            }
            Err(e) => {
                warn!(
                    path = %self.rules_path.display(),
                    error = %e,
                    "rules reload failed, keeping previous rules"
                );
            }
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

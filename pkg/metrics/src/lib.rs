use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

pub const LOGIN_ATTEMPTS: &str = "tenancy_login_attempts_total";
pub const LOGIN_FAILURES: &str = "tenancy_login_cluster_failures_total";
pub const QUOTA_REJECTIONS: &str = "tenancy_quota_rejections_total";
pub const BINDINGS_CREATED: &str = "tenancy_role_bindings_created_total";
pub const BINDINGS_DELETED: &str = "tenancy_role_bindings_deleted_total";
pub const BINDING_ERRORS: &str = "tenancy_role_binding_errors_total";
pub const PROJECTS_CREATED: &str = "tenancy_projects_created_total";
pub const PROJECT_LOCKS: &str = "tenancy_project_locks";

/// A lightweight, thread-safe metrics registry that renders in Prometheus text exposition format.
///
/// Counters carry an optional label set; each distinct set is its own series.
pub struct MetricsRegistry {
    counters: RwLock<BTreeMap<String, Counter>>,
    gauges: RwLock<BTreeMap<String, Gauge>>,
}

/// Monotonically increasing counter, one value per label set.
struct Counter {
    help: String,
    series: RwLock<BTreeMap<String, AtomicU64>>,
}

/// Value that can go up or down.
struct Gauge {
    value: AtomicI64,
    help: String,
}

// a panicking writer cannot leave a counter map half-updated, so poisoned
// locks are still usable
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

/// `{a="x",b="y"}`, or empty for no labels.
fn label_key(labels: &[(&str, &str)]) -> String {
    if labels.is_empty() {
        return String::new();
    }
    let body: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, v.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    format!("{{{}}}", body.join(","))
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(BTreeMap::new()),
            gauges: RwLock::new(BTreeMap::new()),
        }
    }

    /// Registry with every tenancy metric registered.
    pub fn with_tenancy_metrics() -> Self {
        let registry = Self::new();
        registry.register_counter(LOGIN_ATTEMPTS, "Tenant logins by outcome");
        registry.register_counter(LOGIN_FAILURES, "Per-cluster login failures by status");
        registry.register_counter(QUOTA_REJECTIONS, "Quota checks that rejected a change");
        registry.register_counter(BINDINGS_CREATED, "Role bindings created by scope pass");
        registry.register_counter(BINDINGS_DELETED, "Role bindings deleted by scope pass");
        registry.register_counter(BINDING_ERRORS, "Role binding writes that failed");
        registry.register_counter(PROJECTS_CREATED, "Tenant projects created at login");
        registry.register_gauge(PROJECT_LOCKS, "Project locks currently held in the registry");
        registry
    }

    /// Register a counter. If it already exists, this is a no-op.
    pub fn register_counter(&self, name: &str, help: &str) {
        let mut counters = write(&self.counters);
        counters.entry(name.to_string()).or_insert_with(|| Counter {
            help: help.to_string(),
            series: RwLock::new(BTreeMap::new()),
        });
    }

    /// Register a gauge. If it already exists, this is a no-op.
    pub fn register_gauge(&self, name: &str, help: &str) {
        let mut gauges = write(&self.gauges);
        gauges.entry(name.to_string()).or_insert_with(|| Gauge {
            value: AtomicI64::new(0),
            help: help.to_string(),
        });
    }

    /// Increment a counter by 1.
    pub fn counter_inc(&self, name: &str, labels: &[(&str, &str)]) {
        self.counter_add(name, labels, 1);
    }

    /// Increment a counter by a given amount. Unregistered names are ignored.
    pub fn counter_add(&self, name: &str, labels: &[(&str, &str)], val: u64) {
        let counters = read(&self.counters);
        let Some(counter) = counters.get(name) else {
            return;
        };
        let key = label_key(labels);
        if let Some(value) = read(&counter.series).get(&key) {
            value.fetch_add(val, Ordering::Relaxed);
            return;
        }
        write(&counter.series)
            .entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(val, Ordering::Relaxed);
    }

    pub fn counter_value(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        read(&self.counters)
            .get(name)
            .and_then(|c| {
                read(&c.series)
                    .get(&label_key(labels))
                    .map(|v| v.load(Ordering::Relaxed))
            })
            .unwrap_or(0)
    }

    /// Set a gauge to a specific value.
    pub fn gauge_set(&self, name: &str, val: i64) {
        if let Some(g) = read(&self.gauges).get(name) {
            g.value.store(val, Ordering::Relaxed);
        }
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut output = String::new();

        for (name, counter) in read(&self.counters).iter() {
            let _ = writeln!(output, "# HELP {} {}", name, counter.help);
            let _ = writeln!(output, "# TYPE {} counter", name);
            let series = read(&counter.series);
            if series.is_empty() {
                let _ = writeln!(output, "{} 0", name);
            }
            for (labels, value) in series.iter() {
                let _ = writeln!(output, "{}{} {}", name, labels, value.load(Ordering::Relaxed));
            }
        }

        for (name, gauge) in read(&self.gauges).iter() {
            let _ = writeln!(output, "# HELP {} {}", name, gauge.help);
            let _ = writeln!(output, "# TYPE {} gauge", name);
            let _ = writeln!(output, "{} {}", name, gauge.value.load(Ordering::Relaxed));
        }

        output
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

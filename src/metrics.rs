use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Process-wide request counters.
#[derive(Clone)]
pub struct Metrics {
    pub books_created: Arc<AtomicU64>,
    pub books_updated: Arc<AtomicU64>,
    pub books_deleted: Arc<AtomicU64>,
    pub listings: Arc<AtomicU64>,
    pub exports: Arc<AtomicU64>,
    pub logins_ok: Arc<AtomicU64>,
    pub logins_failed: Arc<AtomicU64>,
    pub uploads: Arc<AtomicU64>,
    pub start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            books_created: Arc::new(AtomicU64::new(0)),
            books_updated: Arc::new(AtomicU64::new(0)),
            books_deleted: Arc::new(AtomicU64::new(0)),
            listings: Arc::new(AtomicU64::new(0)),
            exports: Arc::new(AtomicU64::new(0)),
            logins_ok: Arc::new(AtomicU64::new(0)),
            logins_failed: Arc::new(AtomicU64::new(0)),
            uploads: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }

    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            books_created: load(&self.books_created),
            books_updated: load(&self.books_updated),
            books_deleted: load(&self.books_deleted),
            listings: load(&self.listings),
            exports: load(&self.exports),
            logins_ok: load(&self.logins_ok),
            logins_failed: load(&self.logins_failed),
            uploads: load(&self.uploads),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub books_created: u64,
    pub books_updated: u64,
    pub books_deleted: u64,
    pub listings: u64,
    pub exports: u64,
    pub logins_ok: u64,
    pub logins_failed: u64,
    pub uploads: u64,
    pub uptime_seconds: u64,
}

impl MetricsSnapshot {
    /// Prometheus text exposition (format 0.0.4).
    pub fn to_prometheus(&self) -> String {
        let counters = [
            ("books_created", "Books created", self.books_created),
            ("books_updated", "Books updated", self.books_updated),
            ("books_deleted", "Books soft-deleted", self.books_deleted),
            ("listings", "Book listings served", self.listings),
            ("exports", "CSV exports served", self.exports),
            ("logins_ok", "Successful logins", self.logins_ok),
            ("logins_failed", "Failed logins", self.logins_failed),
            ("uploads", "Images uploaded", self.uploads),
        ];
        let mut out = String::new();
        for (name, help, value) in counters {
            out.push_str(&format!(
                "# HELP bookstock_{name} {help}\n# TYPE bookstock_{name} counter\nbookstock_{name} {value}\n"
            ));
        }
        out.push_str(&format!(
            "# HELP bookstock_uptime_seconds Uptime seconds\n# TYPE bookstock_uptime_seconds gauge\nbookstock_uptime_seconds {}\n",
            self.uptime_seconds
        ));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_prometheus_text() {
        let m = Metrics::new();
        Metrics::inc(&m.books_created);
        Metrics::inc(&m.books_created);
        Metrics::inc(&m.logins_failed);
        let text = m.get_snapshot().to_prometheus();
        assert!(text.contains("bookstock_books_created 2\n"));
        assert!(text.contains("bookstock_logins_failed 1\n"));
        assert!(text.contains("# TYPE bookstock_uptime_seconds gauge"));
    }
}

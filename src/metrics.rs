use std::sync::atomic::{AtomicU64, Ordering};

use crate::logging;

#[derive(Debug, Default)]
pub struct Metrics {
    jira_requests: AtomicU64,
    obsidian_requests: AtomicU64,
    notes_written: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_jira_request(&self) {
        self.jira_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_obsidian_request(&self) {
        self.obsidian_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_note_written(&self) {
        self.notes_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.jira_requests.load(Ordering::Relaxed),
            self.obsidian_requests.load(Ordering::Relaxed),
            self.notes_written.load(Ordering::Relaxed),
        )
    }

    pub fn log_snapshot(&self) {
        let (jira, obsidian, written) = self.snapshot();
        logging::debug(format!(
            "metrics jira_requests={} obsidian_requests={} notes_written={}",
            jira, obsidian, written
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_independently() {
        let metrics = Metrics::new();
        metrics.inc_jira_request();
        metrics.inc_jira_request();
        metrics.inc_obsidian_request();
        metrics.inc_note_written();

        assert_eq!(metrics.snapshot(), (2, 1, 1));
    }
}

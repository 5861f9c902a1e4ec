//! Platform diagnostics provider contract.

use std::collections::VecDeque;

use weave_core::Result;

/// Per-thread runtime metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadMetric {
    pub id: u64,
    pub name: Option<String>,
    pub stack_free_current: Option<u32>,
    pub stack_free_minimum: Option<u32>,
    pub stack_size: Option<u32>,
}

/// A software fault observed on the node.
#[derive(Debug, Clone)]
pub struct SoftwareFault {
    pub id: u64,
    pub name: Option<String>,
    pub fault_recording: Option<Vec<u8>>,
}

/// Finite, non-restartable sequence of thread metrics.
///
/// The provider hands over a snapshot it may be holding resources for; the
/// iterator owns that handle and releases it on drop, whether or not the
/// sequence was fully consumed.
pub struct ThreadMetricsSnapshot {
    items: VecDeque<ThreadMetric>,
    release: Option<Box<dyn FnOnce()>>,
}

impl ThreadMetricsSnapshot {
    pub fn new(items: Vec<ThreadMetric>) -> Self {
        Self {
            items: items.into(),
            release: None,
        }
    }

    /// Attach a release hook invoked when the snapshot drops.
    pub fn with_release(mut self, release: impl FnOnce() + 'static) -> Self {
        self.release = Some(Box::new(release));
        self
    }
}

impl Iterator for ThreadMetricsSnapshot {
    type Item = ThreadMetric;

    fn next(&mut self) -> Option<Self::Item> {
        self.items.pop_front()
    }
}

impl Drop for ThreadMetricsSnapshot {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl core::fmt::Debug for ThreadMetricsSnapshot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ThreadMetricsSnapshot")
            .field("remaining", &self.items.len())
            .finish()
    }
}

/// Platform metrics source consumed by the cluster.
///
/// Per-metric getters return `Error::Unsupported` when the platform does
/// not track the value; the cluster encodes those as `0`.
pub trait DiagnosticsProvider {
    fn current_heap_free(&self) -> Result<u64>;
    fn current_heap_used(&self) -> Result<u64>;
    fn current_heap_high_watermark(&self) -> Result<u64>;

    fn supports_watermarks(&self) -> bool {
        false
    }

    /// Reset the high-watermark to the current heap usage.
    fn reset_watermarks(&mut self) -> Result<()>;

    /// Snapshot of per-thread metrics, or `Error::Unsupported` when the
    /// platform has no data.
    fn thread_metrics(&mut self) -> Result<ThreadMetricsSnapshot>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn metric(id: u64) -> ThreadMetric {
        ThreadMetric {
            id,
            name: None,
            stack_free_current: None,
            stack_free_minimum: None,
            stack_size: None,
        }
    }

    #[test]
    fn snapshot_releases_on_drop_even_when_unconsumed() {
        let released = Rc::new(Cell::new(false));
        let flag = released.clone();
        let mut snapshot = ThreadMetricsSnapshot::new(vec![metric(1), metric(2)])
            .with_release(move || flag.set(true));
        assert_eq!(snapshot.next().map(|m| m.id), Some(1));
        drop(snapshot);
        assert!(released.get());
    }

    #[test]
    fn snapshot_is_finite_and_non_restartable() {
        let mut snapshot = ThreadMetricsSnapshot::new(vec![metric(1)]);
        assert!(snapshot.next().is_some());
        assert!(snapshot.next().is_none());
        assert!(snapshot.next().is_none());
    }
}

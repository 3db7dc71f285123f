pub use std::sync::atomic::{AtomicUsize, Ordering};

pub static DEBUG: DebugMetrics = DebugMetrics::new();

pub struct DebugMetrics {
    generation_count: AtomicUsize,
    gather_count: AtomicUsize,
    gather_errors: AtomicUsize,
    sample_count: AtomicUsize,
    gather_task_count: AtomicUsize,
    gather_task_peak: AtomicUsize,
}

impl DebugMetrics {
    pub const fn new() -> Self {
        DebugMetrics {
            generation_count: AtomicUsize::new(0),
            gather_count: AtomicUsize::new(0),
            gather_errors: AtomicUsize::new(0),
            sample_count: AtomicUsize::new(0),
            gather_task_count: AtomicUsize::new(0),
            gather_task_peak: AtomicUsize::new(0),
        }
    }

    pub fn generation_started(&self) {
        self.generation_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn gather_succeeded(&self) {
        self.gather_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn gather_failed(&self) {
        self.gather_count.fetch_add(1, Ordering::Relaxed);
        self.gather_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn samples_stored(&self, n: usize) {
        self.sample_count.fetch_add(n, Ordering::Relaxed);
    }

    pub fn gather_task_started(&self) {
        let concurrent = self.gather_task_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.gather_task_peak.fetch_max(concurrent, Ordering::SeqCst);
    }

    pub fn gather_task_finished(&self) {
        self.gather_task_count.fetch_sub(1, Ordering::Relaxed);
    }

    // Log the current metrics and reset the counters
    pub fn publish(&self) {
        let generations = self.generation_count.swap(0, Ordering::Relaxed);
        let gather_count = self.gather_count.swap(0, Ordering::Relaxed);
        let gather_errors = self.gather_errors.swap(0, Ordering::Relaxed);
        let sample_count = self.sample_count.swap(0, Ordering::Relaxed);
        let task_curr = self.gather_task_count.load(Ordering::Relaxed);
        let task_peak = self.gather_task_peak.swap(task_curr, Ordering::Relaxed);
        log::info!(
            "Debug: generations {} | gathered {} (errors {}) | samples {} | tasks (curr {}, peak {})",
            generations,
            gather_count,
            gather_errors,
            sample_count,
            task_curr,
            task_peak,
        );
    }
}

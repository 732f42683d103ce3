//! Progress counter for the hashing drain.

use kdam::{Animation, Bar, BarExt};
use std::sync::{Arc, Mutex};

pub type ProgressBar = Arc<Mutex<Bar>>;

/// Counter for an unknown total (the walk and the hashing overlap).
pub fn create_counter(desc: &'static str) -> ProgressBar {
    Arc::new(Mutex::new(kdam::tqdm!(
        total = 0,
        desc = desc,
        animation = Animation::Classic,
        position = 0,
        unit = " files"
    )))
}

/// Advance the bar by `n`. Uses `try_lock` so the drain never waits on the renderer;
/// a skipped update is caught up by the final flush.
pub fn update_progress_bar(pb: &ProgressBar, n: usize) -> bool {
    match pb.try_lock() {
        Ok(mut bar) => bar.update(n).is_ok(),
        Err(_) => false,
    }
}

/// Batches counter updates: call [`tick`](Self::tick) per result, [`flush`](Self::flush) at the end.
pub struct BatchedProgress {
    bar: Option<ProgressBar>,
    pending: usize,
    batch: usize,
}

impl BatchedProgress {
    pub fn new(bar: Option<ProgressBar>, batch: usize) -> Self {
        Self {
            bar,
            pending: 0,
            batch: batch.max(1),
        }
    }

    pub fn tick(&mut self) {
        let Some(bar) = &self.bar else {
            return;
        };
        self.pending += 1;
        if self.pending >= self.batch && update_progress_bar(bar, self.pending) {
            self.pending = 0;
        }
    }

    pub fn flush(&mut self) {
        if let Some(bar) = &self.bar
            && self.pending > 0
            && let Ok(mut b) = bar.lock()
        {
            let _ = b.update(self.pending);
            let _ = b.refresh();
            self.pending = 0;
        }
    }
}

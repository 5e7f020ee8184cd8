//! Progress milestones for long batches
//!
//! Batches at or below the threshold report every item. Larger batches
//! report the 1st, 5th, 10th, and 20th item, every 50th item, and the last.

/// Whether `index` (1-based) of `total` is a reporting milestone
#[must_use]
pub fn is_milestone(index: usize, total: usize, threshold: usize) -> bool {
    if total <= threshold {
        return true;
    }
    matches!(index, 1 | 5 | 10 | 20) || index % 50 == 0 || index == total
}

/// Milestone tracker for one batch
#[derive(Debug, Clone)]
pub struct Progress {
    label: &'static str,
    total: usize,
    threshold: usize,
    milestones: Vec<usize>,
}

impl Progress {
    /// Start tracking a batch of `total` items
    #[inline]
    #[must_use]
    pub fn new(label: &'static str, total: usize, threshold: usize) -> Self {
        Self {
            label,
            total,
            threshold,
            milestones: Vec::new(),
        }
    }

    /// Mark item `index` (1-based) as processed
    pub fn tick(&mut self, index: usize) {
        if is_milestone(index, self.total, self.threshold) {
            tracing::info!(
                label = self.label,
                index,
                total = self.total,
                "Progress {}/{}",
                index,
                self.total
            );
            self.milestones.push(index);
        }
    }

    /// Milestones reported so far
    #[inline]
    #[must_use]
    pub fn milestones(&self) -> &[usize] {
        &self.milestones
    }

    /// Consume, yielding reported milestones
    #[inline]
    #[must_use]
    pub fn into_milestones(self) -> Vec<usize> {
        self.milestones
    }
}

//! Sliding-Window Aggregator
//!
//! Collapses a stream of per-frame labels into one verdict per full window.
//!
//! The window is tumbling: once `capacity` labels have been pushed, a
//! verdict is computed by majority vote and the buffer is cleared, so no
//! sample ever contributes to two verdicts. Ties are broken in favour of
//! the tied label whose first occurrence in the window came earliest.
//!
//! Pure and synchronous. Callers own the window and decide when to feed it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::emotion::EmotionLabel;

/// Labels per verdict unless configured otherwise
pub const DEFAULT_WINDOW_SIZE: usize = 10;

/// Result of one full window
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Majority label
    pub dominant_label: EmotionLabel,
    /// Number of samples that produced this verdict
    pub window_size: usize,
    /// When the verdict was computed
    pub computed_at: DateTime<Utc>,
}

/// Tumbling window over detector labels
#[derive(Clone, Debug)]
pub struct EmotionWindow {
    buffer: Vec<EmotionLabel>,
    capacity: usize,
}

impl EmotionWindow {
    /// Create a window emitting one verdict per `capacity` labels (minimum 1)
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Configured window size
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Labels currently buffered
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the buffer is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Append a label; returns a verdict when the window fills
    pub fn push(&mut self, label: EmotionLabel) -> Option<Verdict> {
        self.buffer.push(label);
        if self.buffer.len() < self.capacity {
            return None;
        }

        let dominant_label = majority(&self.buffer)?;
        let verdict = Verdict {
            dominant_label,
            window_size: self.buffer.len(),
            computed_at: Utc::now(),
        };
        self.buffer.clear();

        tracing::debug!(
            label = %verdict.dominant_label,
            window = verdict.window_size,
            "Window verdict"
        );
        Some(verdict)
    }

    /// Drop any partial window
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for EmotionWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}

/// Most frequent label; ties go to the earliest first occurrence
fn majority(labels: &[EmotionLabel]) -> Option<EmotionLabel> {
    // (label, count, first index)
    let mut tally: Vec<(EmotionLabel, usize, usize)> = Vec::with_capacity(EmotionLabel::ALL.len());
    for (idx, label) in labels.iter().enumerate() {
        match tally.iter_mut().find(|(l, _, _)| l == label) {
            Some(entry) => entry.1 += 1,
            None => tally.push((*label, 1, idx)),
        }
    }

    // tally is already ordered by first occurrence, so strict `>` keeps the earliest
    let mut best: Option<(EmotionLabel, usize)> = None;
    for (label, count, _) in tally {
        match best {
            Some((_, best_count)) if count <= best_count => {}
            _ => best = Some((label, count)),
        }
    }
    best.map(|(label, _)| label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use EmotionLabel::{Angry, Happy, Neutral, Sad};

    fn feed(window: &mut EmotionWindow, labels: &[EmotionLabel]) -> Vec<Verdict> {
        labels.iter().filter_map(|l| window.push(*l)).collect()
    }

    #[test]
    fn test_no_verdict_before_window_fills() {
        let mut window = EmotionWindow::new(10);
        let verdicts = feed(&mut window, &[Sad; 9]);
        assert!(verdicts.is_empty());
        assert_eq!(window.len(), 9);
    }

    #[test]
    fn test_majority_wins() {
        let mut window = EmotionWindow::new(10);
        let mut labels = vec![Sad; 7];
        labels.extend([Happy; 3]);
        let verdicts = feed(&mut window, &labels);
        assert_eq!(verdicts.len(), 1);
        assert_eq!(verdicts[0].dominant_label, Sad);
        assert_eq!(verdicts[0].window_size, 10);
    }

    #[test]
    fn test_tie_goes_to_earliest_first_occurrence() {
        let mut window = EmotionWindow::new(10);
        let labels = [Happy, Sad, Happy, Sad, Happy, Sad, Happy, Sad, Happy, Sad];
        let verdicts = feed(&mut window, &labels);
        assert_eq!(verdicts[0].dominant_label, Happy);

        let labels = [Sad, Happy, Sad, Happy, Sad, Happy, Sad, Happy, Sad, Happy];
        let verdicts = feed(&mut window, &labels);
        assert_eq!(verdicts[0].dominant_label, Sad);
    }

    #[test]
    fn test_buffer_clears_after_verdict() {
        let mut window = EmotionWindow::new(10);
        let mut labels = vec![Sad; 10];
        labels.extend([Happy; 10]);
        let verdicts = feed(&mut window, &labels);
        assert_eq!(verdicts.len(), 2);
        assert_eq!(verdicts[0].dominant_label, Sad);
        assert_eq!(verdicts[1].dominant_label, Happy);
        assert!(window.is_empty());
    }

    #[test]
    fn test_one_verdict_per_full_window() {
        let mut window = EmotionWindow::new(4);
        let labels = [Neutral, Angry, Angry, Neutral, Neutral, Sad, Sad, Sad, Happy];
        let verdicts = feed(&mut window, &labels);
        assert_eq!(verdicts.len(), 2);
        assert_eq!(verdicts[0].dominant_label, Neutral);
        assert_eq!(verdicts[1].dominant_label, Sad);
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn test_capacity_floor() {
        let mut window = EmotionWindow::new(0);
        assert_eq!(window.capacity(), 1);
        assert_eq!(window.push(Angry).map(|v| v.dominant_label), Some(Angry));
    }

    #[test]
    fn test_clear_drops_partial_window() {
        let mut window = EmotionWindow::new(3);
        window.push(Sad);
        window.push(Sad);
        window.clear();
        assert!(window.push(Happy).is_none());
        assert!(window.push(Happy).is_none());
        assert_eq!(window.push(Sad).map(|v| v.dominant_label), Some(Happy));
    }
}

//! Track-end detection from polled samples.
//!
//! Providers do not reliably report "track finished". Some stop at the end,
//! others snap the position back to zero and report paused. The detector
//! remembers the furthest position seen for the current queue entry and
//! treats "paused near zero after having reached the end" as finished.

use super::provider::PlaybackSample;

#[derive(Debug)]
pub struct EndDetector {
    end_buffer_ms: u64,
    snap_to_zero_ms: u64,
    queue_id: Option<String>,
    max_seen_ms: u64,
    fired: bool,
}

impl EndDetector {
    pub fn new(end_buffer_ms: u64, snap_to_zero_ms: u64) -> Self {
        Self {
            end_buffer_ms,
            snap_to_zero_ms,
            queue_id: None,
            max_seen_ms: 0,
            fired: false,
        }
    }

    /// Starts tracking a new queue entry (or nothing).
    pub fn reset(&mut self, queue_id: Option<&str>) {
        self.queue_id = queue_id.map(str::to_string);
        self.max_seen_ms = 0;
        self.fired = false;
    }

    pub fn max_seen_ms(&self) -> u64 {
        self.max_seen_ms
    }

    /// Feeds one sample for `queue_id`. Returns true exactly once per queue
    /// entry, on the sample that shows the track has ended.
    ///
    /// `fallback_duration_ms` is used when the sample carries no duration.
    /// A missing sample is ignored.
    pub fn observe(
        &mut self,
        queue_id: &str,
        sample: Option<&PlaybackSample>,
        fallback_duration_ms: Option<u64>,
    ) -> bool {
        if self.queue_id.as_deref() != Some(queue_id) {
            self.reset(Some(queue_id));
        }
        let Some(sample) = sample else {
            return false;
        };

        self.max_seen_ms = self.max_seen_ms.max(sample.position_ms);
        if self.fired {
            return false;
        }

        let Some(duration_ms) = sample
            .duration_ms
            .filter(|d| *d > 0)
            .or(fallback_duration_ms.filter(|d| *d > 0))
        else {
            return false;
        };

        let reached_end = self.max_seen_ms + self.end_buffer_ms >= duration_ms;
        let snapped_back = !sample.is_playing && sample.position_ms <= self.snap_to_zero_ms;

        if reached_end && snapped_back {
            log::debug!(
                "[Client] Track end detected for {} (max seen {}ms of {}ms)",
                queue_id,
                self.max_seen_ms,
                duration_ms
            );
            self.fired = true;
            return true;
        }
        false
    }
}

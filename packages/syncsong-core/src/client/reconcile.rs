//! Playback reconciliation planner.
//!
//! Pure decision logic: given the shared now-playing fact and the local
//! adapter's latest sample, decide which adapter calls bring local playback
//! in line. The controller executes the returned actions.

use crate::model::{NowPlaying, Track};

use super::provider::PlaybackSample;

/// One adapter call the controller should make.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileAction {
    /// Nothing is shared any more; stop the active adapter.
    Idle,
    Pause,
    Resume,
    /// Load the track on the active adapter from the start.
    Load {
        load_key: String,
        queue_id: Option<String>,
        track: Track,
    },
    /// Jump to the shared playhead.
    Seek { position_ms: u64 },
}

/// Identifies one loaded track on one provider. A change of either part
/// requires a reload.
pub fn load_key(queue_id: &str, provider: &str) -> String {
    format!("{}:{}", queue_id, provider)
}

/// Stateful planner for one client.
#[derive(Debug)]
pub struct Reconciler {
    drift_tolerance_ms: u64,
    seek_cooldown_ms: u64,
    loaded_key: Option<String>,
    last_seek_at: Option<u64>,
}

impl Reconciler {
    pub fn new(drift_tolerance_ms: u64, seek_cooldown_ms: u64) -> Self {
        Self {
            drift_tolerance_ms,
            seek_cooldown_ms,
            loaded_key: None,
            last_seek_at: None,
        }
    }

    pub fn loaded_key(&self) -> Option<&str> {
        self.loaded_key.as_deref()
    }

    /// Records a load performed outside the planner (host-initiated).
    pub fn mark_loaded(&mut self, key: String) {
        self.loaded_key = Some(key);
    }

    /// Forgets the loaded track so the next plan reloads it.
    pub fn forget_load(&mut self) {
        self.loaded_key = None;
    }

    /// Starts the seek cooldown as of `now_ms`.
    pub fn note_seek(&mut self, now_ms: u64) {
        self.last_seek_at = Some(now_ms);
    }

    fn in_seek_cooldown(&self, now_ms: u64) -> bool {
        self.last_seek_at
            .is_some_and(|at| now_ms.saturating_sub(at) < self.seek_cooldown_ms)
    }

    /// Plans the adapter calls for `now_playing` on `provider`.
    ///
    /// `follower` is false on the client whose adapter is the source of the
    /// shared playhead. That client only loads entries it does not have yet;
    /// its own play state and position are never corrected from the shared
    /// value, which may be an echo of an older sample.
    pub fn plan(
        &mut self,
        now_playing: Option<&NowPlaying>,
        provider: &str,
        sample: Option<&PlaybackSample>,
        follower: bool,
        now_ms: u64,
    ) -> Vec<ReconcileAction> {
        let Some((np, track)) = now_playing.and_then(|np| np.track.as_ref().map(|t| (np, t)))
        else {
            return match self.loaded_key.take() {
                Some(_) => vec![ReconcileAction::Idle],
                None => Vec::new(),
            };
        };

        if !np.is_playing {
            // Paused: hold whatever is loaded, never load a new track.
            if !follower {
                return Vec::new();
            }
            return match sample {
                Some(s) if !s.is_playing => Vec::new(),
                _ => vec![ReconcileAction::Pause],
            };
        }

        let identity = np
            .queue_id
            .clone()
            .unwrap_or_else(|| format!("{}/{}", track.source.as_str(), track.source_id));
        let key = load_key(&identity, provider);

        if self.loaded_key.as_deref() != Some(key.as_str()) {
            let mut actions = vec![ReconcileAction::Load {
                load_key: key.clone(),
                queue_id: np.queue_id.clone(),
                track: track.clone(),
            }];
            if np.playhead_ms > self.drift_tolerance_ms {
                actions.push(ReconcileAction::Seek {
                    position_ms: np.playhead_ms,
                });
                self.last_seek_at = Some(now_ms);
            }
            self.loaded_key = Some(key);
            return actions;
        }

        let mut actions = Vec::new();
        if !follower {
            return actions;
        }
        if let Some(sample) = sample {
            if !sample.is_playing {
                actions.push(ReconcileAction::Resume);
            }
            let drift = sample.position_ms.abs_diff(np.playhead_ms);
            if drift > self.drift_tolerance_ms && !self.in_seek_cooldown(now_ms) {
                actions.push(ReconcileAction::Seek {
                    position_ms: np.playhead_ms,
                });
                self.last_seek_at = Some(now_ms);
            }
        }
        actions
    }
}

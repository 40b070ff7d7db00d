use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::common::{FrameId, Timestamp};

/// Access history for a single tracked frame
#[derive(Debug)]
struct FrameAccessInfo {
    /// The last k access timestamps, most recent at the back
    history: VecDeque<Timestamp>,
    /// Whether this frame may currently be evicted
    is_evictable: bool,
}

impl FrameAccessInfo {
    fn new() -> Self {
        Self {
            history: VecDeque::new(),
            is_evictable: false,
        }
    }

    fn record_access(&mut self, timestamp: Timestamp, k: usize) {
        self.history.push_back(timestamp);
        while self.history.len() > k {
            self.history.pop_front();
        }
    }

    /// Backward k-distance at `now`. None means fewer than k recorded
    /// accesses, i.e. +inf distance.
    fn k_distance(&self, now: Timestamp, k: usize) -> Option<Timestamp> {
        if self.history.len() < k {
            None
        } else {
            Some(now - self.history[self.history.len() - k])
        }
    }

    /// Earliest recorded access, used to break ties among +inf frames.
    fn earliest_access(&self) -> Timestamp {
        self.history.front().copied().unwrap_or(0)
    }
}

/// State behind the replacer's single mutex
struct ReplacerState {
    /// Access information for each tracked frame
    frames: HashMap<FrameId, FrameAccessInfo>,
    /// Number of frames currently marked evictable
    num_evictable: usize,
    /// Logical clock, bumped on every recorded access
    current_timestamp: Timestamp,
}

/// LRU-K replacement policy.
///
/// The victim is the evictable frame with the largest backward k-distance,
/// where the distance is the gap between now and the k-th most recent
/// access. Frames with fewer than k recorded accesses count as +inf and
/// therefore outrank every finite-distance frame; ties among +inf frames
/// fall back to classical LRU on the earliest recorded access.
pub struct LruKReplacer {
    /// K value for the LRU-K algorithm
    k: usize,
    /// Maximum number of frames the replacer can track
    max_frames: usize,
    state: Mutex<ReplacerState>,
}

impl LruKReplacer {
    /// Creates a new LRU-K replacer for frame ids below `max_frames`.
    pub fn new(k: usize, max_frames: usize) -> Self {
        assert!(k > 0, "LRU-K requires k >= 1");
        Self {
            k,
            max_frames,
            state: Mutex::new(ReplacerState {
                frames: HashMap::new(),
                num_evictable: 0,
                current_timestamp: 0,
            }),
        }
    }

    /// Evicts the evictable frame with the largest backward k-distance,
    /// dropping all trace of it. Returns None if nothing is evictable.
    pub fn evict(&self) -> Option<FrameId> {
        let mut state = self.state.lock();
        if state.num_evictable == 0 {
            return None;
        }

        let now = state.current_timestamp;
        let mut victim: Option<FrameId> = None;
        // (distance, earliest access) of the current best candidate
        let mut victim_dist: Option<Timestamp> = None;
        let mut victim_earliest: Timestamp = 0;

        for (&frame_id, info) in state.frames.iter() {
            if !info.is_evictable {
                continue;
            }

            let dist = info.k_distance(now, self.k);
            let earliest = info.earliest_access();

            let better = match (victim_dist, dist) {
                (None, Some(_)) => false,
                (Some(_), None) => true,
                (None, None) => earliest < victim_earliest,
                (Some(best), Some(cand)) => cand > best,
            };

            if victim.is_none() || better {
                victim = Some(frame_id);
                victim_dist = dist;
                victim_earliest = earliest;
            }
        }

        if let Some(frame_id) = victim {
            state.frames.remove(&frame_id);
            state.num_evictable -= 1;
        }
        victim
    }

    /// Records an access to `frame_id` at the current logical time. A
    /// frame seen for the first time starts out non-evictable.
    pub fn record_access(&self, frame_id: FrameId) {
        if frame_id.as_usize() >= self.max_frames {
            return;
        }

        let mut state = self.state.lock();
        state.current_timestamp += 1;
        let timestamp = state.current_timestamp;
        state
            .frames
            .entry(frame_id)
            .or_insert_with(FrameAccessInfo::new)
            .record_access(timestamp, self.k);
    }

    /// Toggles whether a frame may be evicted. Untracked frames are
    /// ignored.
    pub fn set_evictable(&self, frame_id: FrameId, is_evictable: bool) {
        if frame_id.as_usize() >= self.max_frames {
            return;
        }

        let mut state = self.state.lock();
        let Some(info) = state.frames.get_mut(&frame_id) else {
            return;
        };
        if info.is_evictable != is_evictable {
            info.is_evictable = is_evictable;
            if is_evictable {
                state.num_evictable += 1;
            } else {
                state.num_evictable -= 1;
            }
        }
    }

    /// Forcibly untracks a frame.
    ///
    /// # Panics
    ///
    /// Panics if the frame is tracked but not evictable; the caller is
    /// required to unpin before removing.
    pub fn remove(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        if let Some(info) = state.frames.get(&frame_id) {
            assert!(
                info.is_evictable,
                "removing non-evictable {frame_id} from the replacer"
            );
            state.frames.remove(&frame_id);
            state.num_evictable -= 1;
        }
    }

    /// Returns the number of evictable frames.
    pub fn size(&self) -> usize {
        self.state.lock().num_evictable
    }

    /// Returns the k value of this replacer.
    pub fn k(&self) -> usize {
        self.k
    }
}

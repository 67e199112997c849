//! Detection of captures whose output stopped growing.

use std::collections::HashMap;

use super::job::JobId;

/// Result of feeding one size sample to the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Size changed, or not enough unchanged samples yet.
    Growing { unchanged: u32 },
    /// `threshold` consecutive samples showed the same size.
    Stalled { unchanged: u32 },
}

impl Observation {
    pub fn unchanged(&self) -> u32 {
        match *self {
            Self::Growing { unchanged } | Self::Stalled { unchanged } => unchanged,
        }
    }

    pub fn is_stalled(&self) -> bool {
        matches!(self, Self::Stalled { .. })
    }
}

#[derive(Debug, Clone, Copy)]
struct Track {
    last_size: u64,
    unchanged: u32,
}

/// Counts consecutive unchanged size samples per job.
#[derive(Debug)]
pub struct StallDetector {
    threshold: u32,
    tracks: HashMap<JobId, Track>,
}

impl StallDetector {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            tracks: HashMap::new(),
        }
    }

    /// Feed a size sample. The first sample of a job only sets the baseline.
    pub fn observe(&mut self, id: &JobId, size: u64) -> Observation {
        let Some(track) = self.tracks.get_mut(id) else {
            self.tracks.insert(
                id.clone(),
                Track {
                    last_size: size,
                    unchanged: 0,
                },
            );
            return Observation::Growing { unchanged: 0 };
        };

        if track.last_size == size {
            track.unchanged += 1;
        } else {
            track.last_size = size;
            track.unchanged = 0;
        }

        if track.unchanged >= self.threshold {
            Observation::Stalled {
                unchanged: track.unchanged,
            }
        } else {
            Observation::Growing {
                unchanged: track.unchanged,
            }
        }
    }

    /// Clear the counter and take `size` as the new baseline, e.g. when
    /// sampling moves to a freshly started segment.
    pub fn rebase(&mut self, id: &JobId, size: u64) {
        self.tracks.insert(
            id.clone(),
            Track {
                last_size: size,
                unchanged: 0,
            },
        );
    }

    pub fn forget(&mut self, id: &JobId) {
        self.tracks.remove(id);
    }
}

//! Insertion-ordered set of in-flight jobs.

use std::path::Path;

use super::job::{Job, JobId};

/// All jobs the supervisor currently tracks, oldest first.
///
/// Lookups are linear scans; a client rarely has more than a handful of
/// simultaneous recordings.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: Vec<Job>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a job. Returns the job back if its id is already tracked.
    pub fn insert(&mut self, job: Job) -> Result<(), Job> {
        if self.contains(&job.id) {
            return Err(job);
        }
        self.jobs.push(job);
        Ok(())
    }

    pub fn remove(&mut self, id: &JobId) -> Option<Job> {
        let idx = self.jobs.iter().position(|j| &j.id == id)?;
        Some(self.jobs.remove(idx))
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.jobs.iter().any(|j| &j.id == id)
    }

    pub fn get(&self, id: &JobId) -> Option<&Job> {
        self.jobs.iter().find(|j| &j.id == id)
    }

    pub fn get_mut(&mut self, id: &JobId) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|j| &j.id == id)
    }

    /// First job recording `channel`.
    pub fn find_by_channel(&self, channel: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.channel == channel)
    }

    /// Local job requested for `path` or currently writing a segment there.
    pub fn find_by_output(&self, path: &Path) -> Option<&Job> {
        self.jobs
            .iter()
            .find(|j| j.as_local().is_some_and(|l| l.writes_to(path)))
    }

    /// Whether a non-terminal local job writes to `path`.
    pub fn path_in_use(&self, path: &Path) -> bool {
        self.find_by_output(path)
            .is_some_and(|j| !j.state().is_terminal())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Job> {
        self.jobs.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

//! The recording job supervisor.
//!
//! Owns every in-flight [`Job`], starts local captures and remote DVR
//! entries, samples local output on each [`Supervisor::tick`], restarts
//! stalled captures into a new segment file, and stops jobs on request.
//!
//! All mutable state sits behind one `parking_lot` mutex which is never held
//! across an `.await`: process handles are taken out of their job before
//! they are stopped and put back (or dropped) afterwards. Captures the tick
//! gives up on are stopped on background tasks so a slow encoder never holds
//! up monitoring of the others.

use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::events::{JobFailure, SupervisorEvent};
use super::job::{Job, JobId, JobKind, JobPayload, JobState, LocalJob, RemoteJob, segment_path};
use super::registry::JobRegistry;
use super::stall::StallDetector;
use super::status::{self, StatusRow};
use crate::capture::{CaptureLauncher, CaptureProcess, CaptureSpec, ProcessStatus};
use crate::catalog::{Channel, ChannelCatalog};
use crate::dvr::{CreateEntry, DvrClient, DvrEntry, DvrError};
use crate::{Error, Result};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Comment attached to backend entries created by this client.
const ENTRY_COMMENT: &str = "Created by tvrec";

/// Tunables of the supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Period of the monitoring tick.
    pub monitor_interval: Duration,
    /// Consecutive unchanged size samples before a capture counts as stalled.
    pub stall_threshold: u32,
    /// Restarts allowed per stall streak before the job fails.
    pub max_stall_restarts: u32,
    /// How long a capture may take to quit before it is killed.
    pub stop_grace: Duration,
    /// Bound on backend create and list calls.
    pub request_timeout: Duration,
    /// Bound on backend stop calls.
    pub stop_timeout: Duration,
    /// Bound on resolving and launching one capture.
    pub launch_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            monitor_interval: Duration::from_secs(2),
            stall_threshold: 5,
            max_stall_restarts: 1,
            stop_grace: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            stop_timeout: Duration::from_secs(5),
            launch_timeout: Duration::from_secs(10),
        }
    }
}

/// Where a recording should happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartKind {
    /// Capture the stream into `output_path` on this machine.
    Local {
        output_path: PathBuf,
        profile: Option<String>,
    },
    /// Ask the backend DVR to record `channel_id` between `start` and `stop`
    /// (epoch seconds).
    Remote {
        channel_id: String,
        start: i64,
        stop: i64,
        title: String,
        subtitle: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartRequest {
    pub channel: Channel,
    pub kind: StartKind,
}

impl StartRequest {
    pub fn local(channel: Channel, output_path: impl Into<PathBuf>) -> Self {
        Self {
            channel,
            kind: StartKind::Local {
                output_path: output_path.into(),
                profile: None,
            },
        }
    }

    pub fn remote(channel: Channel, channel_id: impl Into<String>, start: i64, stop: i64) -> Self {
        let title = format!("Manual Recording - {}", channel.name);
        Self {
            channel,
            kind: StartKind::Remote {
                channel_id: channel_id.into(),
                start,
                stop,
                title,
                subtitle: None,
            },
        }
    }

    /// Streaming profile for local captures.
    pub fn with_profile(mut self, value: impl Into<String>) -> Self {
        if let StartKind::Local { profile, .. } = &mut self.kind {
            *profile = Some(value.into());
        }
        self
    }

    /// Title for remote entries.
    pub fn with_title(mut self, value: impl Into<String>) -> Self {
        if let StartKind::Remote { title, .. } = &mut self.kind {
            *title = value.into();
        }
        self
    }

    /// Subtitle for remote entries.
    pub fn with_subtitle(mut self, value: impl Into<String>) -> Self {
        if let StartKind::Remote { subtitle, .. } = &mut self.kind {
            *subtitle = Some(value.into());
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.channel.name.trim().is_empty() {
            return Err(Error::validation("channel name must not be empty"));
        }
        match &self.kind {
            StartKind::Local { output_path, .. } => {
                if output_path.file_name().is_none() {
                    return Err(Error::validation(format!(
                        "output path {} has no file name",
                        output_path.display()
                    )));
                }
            }
            StartKind::Remote {
                channel_id,
                start,
                stop,
                ..
            } => {
                if channel_id.trim().is_empty() {
                    return Err(Error::validation("backend channel id must not be empty"));
                }
                if stop <= start {
                    return Err(Error::validation(format!(
                        "stop time {stop} must be after start time {start}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Result of a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    /// Nothing was running under that id any more.
    AlreadyStopped,
    /// No job or backend entry matched the reference.
    NoMatch,
}

/// One size sample of a local job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoringSample {
    pub job_id: JobId,
    pub size: u64,
    pub ticks_since_growth: u32,
}

/// What one monitoring tick observed and did.
#[derive(Debug, Default)]
pub struct TickReport {
    pub samples: Vec<MonitoringSample>,
    pub restarted: Vec<JobId>,
    pub failed: Vec<JobId>,
    pub completed: Vec<JobId>,
}

struct SupervisorState {
    registry: JobRegistry,
    detector: StallDetector,
    /// Channels with a start in progress.
    starting_channels: HashSet<String>,
    /// Output paths claimed by starts in progress.
    reserved_paths: HashSet<PathBuf>,
}

/// Releases a channel (and output path) claimed for a start, however the
/// start ends.
struct InFlightGuard<'a> {
    state: &'a Mutex<SupervisorState>,
    channel: String,
    path: Option<PathBuf>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.starting_channels.remove(&self.channel);
        if let Some(path) = &self.path {
            state.reserved_paths.remove(path);
        }
    }
}

impl SupervisorState {
    /// First restart segment of `id` after its current one that no other job
    /// or pending start claims.
    fn next_segment(&self, id: &JobId) -> Option<u32> {
        let local = self.registry.get(id)?.as_local()?;
        let mut segment = local.segment + 1;
        loop {
            let candidate = segment_path(&local.output_path, segment);
            let taken = self.reserved_paths.contains(&candidate)
                || self.registry.iter().any(|job| {
                    &job.id != id && job.as_local().is_some_and(|l| l.writes_to(&candidate))
                });
            if !taken {
                return Some(segment);
            }
            segment += 1;
        }
    }
}

/// Decision taken for one sampled job while the lock is held.
enum Verdict {
    Sampled,
    Exited {
        code: Option<i32>,
        bytes_written: u64,
        diagnostics: Vec<String>,
    },
    Restart {
        process: Option<Box<dyn CaptureProcess>>,
        restarts: u32,
    },
    GiveUp {
        process: Option<Box<dyn CaptureProcess>>,
        restarts: u32,
    },
}

struct PendingRestart {
    id: JobId,
    channel: String,
    source: Channel,
    profile: Option<String>,
    segment_path: PathBuf,
    restarts: u32,
}

pub struct Supervisor {
    config: SupervisorConfig,
    launcher: Arc<dyn CaptureLauncher>,
    catalog: Arc<dyn ChannelCatalog>,
    dvr: Option<Arc<dyn DvrClient>>,
    state: Mutex<SupervisorState>,
    /// Captures being stopped off the monitoring path.
    stopping: Mutex<JoinSet<()>>,
    event_tx: broadcast::Sender<SupervisorEvent>,
}

impl Supervisor {
    pub fn new(
        config: SupervisorConfig,
        launcher: Arc<dyn CaptureLauncher>,
        catalog: Arc<dyn ChannelCatalog>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let detector = StallDetector::new(config.stall_threshold);

        Self {
            config,
            launcher,
            catalog,
            dvr: None,
            state: Mutex::new(SupervisorState {
                registry: JobRegistry::new(),
                detector,
                starting_channels: HashSet::new(),
                reserved_paths: HashSet::new(),
            }),
            stopping: Mutex::new(JoinSet::new()),
            event_tx,
        }
    }

    /// Enable remote recordings through a backend DVR.
    pub fn with_dvr(mut self, dvr: Arc<dyn DvrClient>) -> Self {
        self.dvr = Some(dvr);
        self
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.event_tx.subscribe()
    }

    /// Current jobs in registry order.
    pub fn status(&self) -> Vec<StatusRow> {
        status::project(&self.state.lock().registry)
    }

    pub fn job_count(&self) -> usize {
        self.state.lock().registry.len()
    }

    pub fn job_state(&self, id: &JobId) -> Option<JobState> {
        self.state.lock().registry.get(id).map(Job::state)
    }

    fn dvr(&self) -> Result<&Arc<dyn DvrClient>> {
        self.dvr
            .as_ref()
            .ok_or_else(|| Error::config("no DVR backend is configured for remote recordings"))
    }

    fn emit(&self, event: SupervisorEvent) {
        debug!(job_id = %event.job_id(), "{}", event.description());
        let _ = self.event_tx.send(event);
    }

    /// Start a recording. On success exactly one new `Active` job exists.
    pub async fn request_start(&self, request: StartRequest) -> Result<JobId> {
        request.validate()?;

        let StartRequest { channel, kind } = request;
        match kind {
            StartKind::Local {
                output_path,
                profile,
            } => self.start_local(channel, output_path, profile).await,
            StartKind::Remote {
                channel_id,
                start,
                stop,
                title,
                subtitle,
            } => {
                let mut entry =
                    CreateEntry::new(channel_id, start, stop, title).with_comment(ENTRY_COMMENT);
                if let Some(subtitle) = subtitle {
                    entry = entry.with_subtitle(subtitle);
                }
                self.start_remote(channel, entry).await
            }
        }
    }

    async fn start_local(
        &self,
        channel: Channel,
        output_path: PathBuf,
        profile: Option<String>,
    ) -> Result<JobId> {
        let output_path = std::path::absolute(&output_path)
            .map_err(|e| Error::io_path("resolving", &output_path, e))?;
        let _guard = self.reserve(&channel.name, Some(&output_path))?;

        let process = self
            .launch_capture(&channel, profile.as_deref(), &output_path)
            .await?;

        let id = JobId::generate();
        let name = channel.name.clone();
        let mut job = Job::local(
            id.clone(),
            name.clone(),
            LocalJob::new(output_path.clone(), channel, profile, process),
        );
        job.transition(JobState::Active)?;

        self.state
            .lock()
            .registry
            .insert(job)
            .map_err(|job| Error::Other(format!("job {} is already tracked", job.id)))?;

        info!(
            job_id = %id,
            channel = %name,
            path = %output_path.display(),
            "Started local recording"
        );
        self.emit(SupervisorEvent::JobStarted {
            job_id: id.clone(),
            channel: name,
            kind: JobKind::Local,
            output_path: Some(output_path),
            timestamp: Utc::now(),
        });
        Ok(id)
    }

    async fn start_remote(&self, channel: Channel, entry: CreateEntry) -> Result<JobId> {
        let dvr = self.dvr()?;
        let _guard = self.reserve(&channel.name, None)?;

        let entry_id = bounded(self.config.request_timeout, dvr.create_entry(&entry)).await?;

        let title = entry.title.values().next().cloned().unwrap_or_default();
        let mut job = Job::remote(
            channel.name.clone(),
            RemoteJob {
                entry_id,
                channel_id: entry.channel,
                start: entry.start,
                stop: entry.stop,
                title,
            },
        );
        job.transition(JobState::Active)?;
        let id = job.id.clone();

        self.state
            .lock()
            .registry
            .insert(job)
            .map_err(|job| Error::Other(format!("entry {} is already tracked", job.id)))?;

        info!(job_id = %id, channel = %channel.name, "Started remote recording");
        self.emit(SupervisorEvent::JobStarted {
            job_id: id.clone(),
            channel: channel.name,
            kind: JobKind::Remote,
            output_path: None,
            timestamp: Utc::now(),
        });
        Ok(id)
    }

    /// Claim `channel` (and `path`) for a start in progress.
    fn reserve(&self, channel: &str, path: Option<&Path>) -> Result<InFlightGuard<'_>> {
        let mut state = self.state.lock();

        if let Some(path) = path
            && (state.registry.path_in_use(path) || state.reserved_paths.contains(path))
        {
            return Err(Error::PathInUse(path.to_path_buf()));
        }
        if !state.starting_channels.insert(channel.to_string()) {
            return Err(Error::StartInFlight(channel.to_string()));
        }
        if let Some(path) = path {
            state.reserved_paths.insert(path.to_path_buf());
        }

        Ok(InFlightGuard {
            state: &self.state,
            channel: channel.to_string(),
            path: path.map(Path::to_path_buf),
        })
    }

    /// Resolve the stream and start an encoder, bounded by `launch_timeout`.
    async fn launch_capture(
        &self,
        channel: &Channel,
        profile: Option<&str>,
        output_path: &Path,
    ) -> Result<Box<dyn CaptureProcess>> {
        let limit = self.config.launch_timeout;
        let launch = async {
            let url = self.catalog.resolve_stream_url(channel, profile).await?;
            let spec = CaptureSpec::new(url.to_string(), output_path);
            debug!(
                channel = %channel.name,
                container = %spec.container(),
                "Launching capture"
            );
            Ok::<_, Error>(self.launcher.launch(&spec).await?)
        };
        tokio::time::timeout(limit, launch)
            .await
            .unwrap_or(Err(Error::LaunchTimeout(limit)))
    }

    /// Stop `process` on a background task.
    fn stop_in_background(&self, mut process: Box<dyn CaptureProcess>) {
        let grace = self.config.stop_grace;
        let mut tasks = self.stopping.lock();
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move { process.stop(grace).await });
    }

    /// Wait until every capture handed to a background stop has exited.
    pub async fn finish_background_stops(&self) {
        let mut tasks = std::mem::take(&mut *self.stopping.lock());
        while tasks.join_next().await.is_some() {}
    }

    /// Sample every active local job once and react to exits and stalls.
    pub async fn tick(&self) -> TickReport {
        let polled: Vec<(JobId, PathBuf, ProcessStatus)> = {
            let mut state = self.state.lock();
            state
                .registry
                .iter_mut()
                .filter(|job| job.state() == JobState::Active)
                .filter_map(|job| {
                    let id = job.id.clone();
                    let local = job.as_local_mut()?;
                    let status = local.process.as_mut()?.poll();
                    Some((id, local.capture_path.clone(), status))
                })
                .collect()
        };

        let mut sampled = Vec::with_capacity(polled.len());
        for (id, path, status) in polled {
            let size = tokio::fs::metadata(&path).await.ok().map(|m| m.len());
            sampled.push((id, status, size));
        }

        let mut report = TickReport::default();
        let mut events = Vec::new();
        let mut abandoned = Vec::new();
        let mut restarts = Vec::new();

        {
            let mut guard = self.state.lock();
            let state = &mut *guard;

            for (id, status, size) in sampled {
                let verdict = {
                    let Some(job) = state
                        .registry
                        .get_mut(&id)
                        .filter(|job| job.state() == JobState::Active)
                    else {
                        continue;
                    };
                    let Some(local) = job.as_local_mut() else {
                        continue;
                    };
                    if local.process.is_none() {
                        continue;
                    }

                    local.record_size(size);
                    match status {
                        ProcessStatus::Exited(code) => {
                            let diagnostics = local
                                .process
                                .take()
                                .map(|p| p.diagnostics())
                                .unwrap_or_default();
                            Verdict::Exited {
                                code,
                                bytes_written: local.bytes_written(),
                                diagnostics,
                            }
                        }
                        ProcessStatus::Running => {
                            if local.stall_restarts > 0 && local.outgrew_restart() {
                                local.stall_restarts = 0;
                            }
                            let observation = state.detector.observe(&id, local.current_size);
                            report.samples.push(MonitoringSample {
                                job_id: id.clone(),
                                size: local.current_size,
                                ticks_since_growth: observation.unchanged(),
                            });

                            if !observation.is_stalled() {
                                Verdict::Sampled
                            } else if local.stall_restarts < self.config.max_stall_restarts {
                                local.stall_restarts += 1;
                                Verdict::Restart {
                                    process: local.process.take(),
                                    restarts: local.stall_restarts,
                                }
                            } else {
                                Verdict::GiveUp {
                                    process: local.process.take(),
                                    restarts: local.stall_restarts,
                                }
                            }
                        }
                    }
                };

                match verdict {
                    Verdict::Sampled => {}
                    Verdict::Exited {
                        code,
                        bytes_written,
                        diagnostics,
                    } => {
                        state.detector.forget(&id);
                        let Some(mut job) = state.registry.remove(&id) else {
                            continue;
                        };

                        if code == Some(0) && bytes_written > 0 {
                            settle(&mut job, JobState::Stopped);
                            info!(job_id = %id, channel = %job.channel, bytes_written, "Capture finished");
                            report.completed.push(id.clone());
                            events.push(SupervisorEvent::JobCompleted {
                                job_id: id,
                                channel: job.channel,
                                bytes_written,
                                timestamp: Utc::now(),
                            });
                        } else {
                            settle(&mut job, JobState::Failed);
                            warn!(
                                job_id = %id,
                                channel = %job.channel,
                                code = ?code,
                                bytes_written,
                                "Capture exited abnormally"
                            );
                            report.failed.push(id.clone());
                            events.push(SupervisorEvent::JobFailed {
                                job_id: id,
                                channel: job.channel,
                                failure: JobFailure::ProcessExitedAbnormally {
                                    code,
                                    bytes_written,
                                    diagnostics,
                                },
                                timestamp: Utc::now(),
                            });
                        }
                    }
                    Verdict::Restart { process, restarts: count } => {
                        abandoned.extend(process);
                        let Some(segment) = state.next_segment(&id) else {
                            continue;
                        };
                        let Some(job) = state.registry.get_mut(&id) else {
                            continue;
                        };
                        let channel = job.channel.clone();
                        let Some(local) = job.as_local_mut() else {
                            continue;
                        };
                        let stalled_path = local.capture_path.clone();
                        let segment_path = local.begin_segment(segment);
                        // The new segment starts out empty.
                        state.detector.rebase(&id, 0);
                        warn!(
                            job_id = %id,
                            channel = %channel,
                            restarts = count,
                            stalled = %stalled_path.display(),
                            segment = %segment_path.display(),
                            "Capture output stalled, restarting"
                        );
                        restarts.push(PendingRestart {
                            id: id.clone(),
                            channel,
                            source: local.source.clone(),
                            profile: local.profile.clone(),
                            segment_path,
                            restarts: count,
                        });
                    }
                    Verdict::GiveUp { process, restarts } => {
                        abandoned.extend(process);
                        state.detector.forget(&id);
                        let Some(mut job) = state.registry.remove(&id) else {
                            continue;
                        };
                        settle(&mut job, JobState::Failed);
                        warn!(job_id = %id, channel = %job.channel, restarts, "Capture stalled, giving up");
                        report.failed.push(id.clone());
                        events.push(SupervisorEvent::JobFailed {
                            job_id: id,
                            channel: job.channel,
                            failure: JobFailure::Stalled { restarts },
                            timestamp: Utc::now(),
                        });
                    }
                }
            }
        }

        for event in events {
            self.emit(event);
        }
        for process in abandoned {
            self.stop_in_background(process);
        }

        let relaunched = join_all(restarts.into_iter().map(|pending| async move {
            let launched = self
                .launch_capture(&pending.source, pending.profile.as_deref(), &pending.segment_path)
                .await;
            (pending, launched)
        }))
        .await;
        for (pending, launched) in relaunched {
            self.finish_restart(pending, launched, &mut report);
        }

        report
    }

    /// Hand a relaunched capture to its job, unless a stop won the race.
    fn finish_restart(
        &self,
        pending: PendingRestart,
        launched: Result<Box<dyn CaptureProcess>>,
        report: &mut TickReport,
    ) {
        let PendingRestart {
            id,
            channel,
            segment_path,
            restarts,
            ..
        } = pending;

        let (orphan, event) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;

            // A stop that raced the restart leaves the job gone or stopping.
            let awaiting = state.registry.get(&id).is_some_and(|job| {
                job.state() == JobState::Active
                    && job.as_local().is_some_and(|l| l.process.is_none())
            });

            match launched {
                Ok(process) if awaiting => {
                    if let Some(local) = state.registry.get_mut(&id).and_then(Job::as_local_mut) {
                        local.process = Some(process);
                    }
                    info!(job_id = %id, restarts, segment = %segment_path.display(), "Capture restarted");
                    report.restarted.push(id.clone());
                    let event = SupervisorEvent::JobRestarted {
                        job_id: id.clone(),
                        channel,
                        restarts,
                        segment_path,
                        timestamp: Utc::now(),
                    };
                    (None, Some(event))
                }
                Ok(process) => (Some(process), None),
                Err(e) if awaiting => {
                    state.detector.forget(&id);
                    if let Some(mut job) = state.registry.remove(&id) {
                        settle(&mut job, JobState::Failed);
                    }
                    warn!(job_id = %id, error = %e, "Capture restart failed");
                    report.failed.push(id.clone());
                    let event = SupervisorEvent::JobFailed {
                        job_id: id.clone(),
                        channel,
                        failure: JobFailure::RestartFailed(e.to_string()),
                        timestamp: Utc::now(),
                    };
                    (None, Some(event))
                }
                Err(_) => (None, None),
            }
        };

        if let Some(event) = event {
            self.emit(event);
        }
        if let Some(process) = orphan {
            debug!(job_id = %id, "Job stopped during restart, discarding new capture");
            self.stop_in_background(process);
        }
    }

    /// Stop a job. Unknown ids and jobs already stopping report
    /// [`StopOutcome::AlreadyStopped`].
    pub async fn request_stop(&self, id: &JobId) -> Result<StopOutcome> {
        enum Target {
            Local(Option<Box<dyn CaptureProcess>>),
            Remote(String),
        }

        let target = {
            let mut state = self.state.lock();
            let Some(job) = state.registry.get_mut(id) else {
                return Ok(StopOutcome::AlreadyStopped);
            };
            if job.state() != JobState::Active {
                return Ok(StopOutcome::AlreadyStopped);
            }
            job.transition(JobState::Stopping)?;

            match &mut job.payload {
                JobPayload::Local(local) => Target::Local(local.process.take()),
                JobPayload::Remote(remote) => Target::Remote(remote.entry_id.clone()),
            }
        };

        match target {
            Target::Local(process) => {
                if let Some(mut process) = process {
                    process.stop(self.config.stop_grace).await;
                }
                self.retire_stopped(id);
                Ok(StopOutcome::Stopped)
            }
            Target::Remote(entry_id) => {
                let dvr = self.dvr()?;
                let timeout = self.config.stop_timeout;
                match bounded(timeout, dvr.stop_entry(&entry_id, timeout)).await {
                    Ok(()) => {
                        self.retire_stopped(id);
                        Ok(StopOutcome::Stopped)
                    }
                    Err(DvrError::NotFound(_)) => {
                        debug!(job_id = %id, "Entry already gone on the backend");
                        self.retire_stopped(id);
                        Ok(StopOutcome::AlreadyStopped)
                    }
                    Err(e) => {
                        if let Some(job) = self.state.lock().registry.get_mut(id) {
                            job.transition(JobState::Active)?;
                        }
                        warn!(job_id = %id, error = %e, "Failed to stop remote recording");
                        Err(e.into())
                    }
                }
            }
        }
    }

    fn retire_stopped(&self, id: &JobId) {
        let removed = {
            let mut state = self.state.lock();
            state.detector.forget(id);
            state.registry.remove(id)
        };
        let Some(mut job) = removed else {
            return;
        };
        settle(&mut job, JobState::Stopped);

        info!(job_id = %id, channel = %job.channel, "Recording stopped");
        self.emit(SupervisorEvent::JobStopped {
            job_id: job.id,
            channel: job.channel,
            timestamp: Utc::now(),
        });
    }

    /// Stop the job recording a channel (remote) or writing a file (local).
    pub async fn request_stop_by_channel_or_file(&self, reference: &str) -> Result<StopOutcome> {
        let absolute = std::path::absolute(reference).ok();
        let id = {
            let state = self.state.lock();
            state
                .registry
                .iter()
                .find(|job| match job.as_local() {
                    Some(local) => {
                        local.writes_to(Path::new(reference))
                            || absolute.as_deref().is_some_and(|path| local.writes_to(path))
                    }
                    None => job.channel == reference,
                })
                .map(|job| job.id.clone())
        };

        match id {
            Some(id) => self.request_stop(&id).await,
            None => Ok(StopOutcome::NoMatch),
        }
    }

    /// Stop whatever records `channel`, asking the backend when the registry
    /// does not know the recording.
    pub async fn stop_running_on_channel(&self, channel: &str) -> Result<StopOutcome> {
        let tracked = self
            .state
            .lock()
            .registry
            .find_by_channel(channel)
            .map(|job| job.id.clone());
        if let Some(id) = tracked {
            return self.request_stop(&id).await;
        }

        let Some(dvr) = &self.dvr else {
            return Ok(StopOutcome::NoMatch);
        };
        let entries = bounded(self.config.request_timeout, dvr.list_entries()).await?;
        let running: Vec<DvrEntry> = entries
            .into_iter()
            .filter(|e| e.is_running() && e.channelname == channel)
            .collect();
        if running.is_empty() {
            return Ok(StopOutcome::NoMatch);
        }

        let timeout = self.config.stop_timeout;
        let mut outcome = StopOutcome::AlreadyStopped;
        for entry in running {
            match bounded(timeout, dvr.stop_entry(&entry.uuid, timeout)).await {
                Ok(()) => {
                    info!(entry_id = %entry.uuid, channel, "Stopped untracked backend recording");
                    outcome = StopOutcome::Stopped;
                }
                Err(DvrError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(outcome)
    }

    /// Every entry the backend DVR knows about.
    pub async fn backend_entries(&self) -> Result<Vec<DvrEntry>> {
        let dvr = self.dvr()?;
        Ok(bounded(self.config.request_timeout, dvr.list_entries()).await?)
    }

    /// Stop every local capture. Remote entries keep recording on the backend.
    pub async fn shutdown(&self) {
        let local_ids: Vec<JobId> = self
            .state
            .lock()
            .registry
            .iter()
            .filter(|job| job.kind() == JobKind::Local)
            .map(|job| job.id.clone())
            .collect();

        for id in local_ids {
            if let Err(e) = self.request_stop(&id).await {
                warn!(job_id = %id, error = %e, "Failed to stop capture during shutdown");
            }
        }
        self.finish_background_stops().await;
    }
}

/// Drive a removed job to its terminal state.
fn settle(job: &mut Job, target: JobState) {
    if target == JobState::Stopped && job.state() == JobState::Active {
        let _ = job.transition(JobState::Stopping);
    }
    if let Err(e) = job.transition(target) {
        warn!(job_id = %job.id, error = %e, "Unexpected job state on removal");
    }
}

async fn bounded<T>(
    limit: Duration,
    request: impl Future<Output = std::result::Result<T, DvrError>>,
) -> std::result::Result<T, DvrError> {
    tokio::time::timeout(limit, request)
        .await
        .unwrap_or(Err(DvrError::Timeout))
}

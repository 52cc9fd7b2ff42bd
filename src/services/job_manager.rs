use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use tracing::{info, warn};
use uuid::Uuid;
use zip::write::SimpleFileOptions;

use crate::models::error::{FarmError, Result};
use crate::models::file_asset::FileAsset;
use crate::models::frame_range::FrameRange;
use crate::models::job::{Job, JobStatus};
use crate::models::settings::ServerSetting;
use crate::services::hashing;

/// What a submitting host sends to create a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSubmission {
    pub frames: Vec<FrameRange>,
    pub files: Vec<FileAsset>,
    pub renderer_version: Version,
}

/// The exclusive assignment of one frame to one worker, together with
/// everything the worker needs to fetch before rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameLease {
    pub job_id: String,
    pub frame: i32,
    pub renderer_version: Version,
    pub files: Vec<FileAsset>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub worker: Uuid,
}

/// Authoritative job/frame table, owned exclusively by the master process.
/// Every transition happens under one lock so concurrent dispatch requests
/// can never hand the same frame to two workers.
pub struct JobManager {
    jobs: Mutex<HashMap<String, Job>>,
    setting: ServerSetting,
}

impl JobManager {
    pub fn new(setting: ServerSetting) -> Result<Self> {
        setting.prepare()?;
        Ok(Self {
            jobs: Mutex::new(HashMap::new()),
            setting,
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Job>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn file_path(&self, job_id: &str, index: usize) -> PathBuf {
        self.setting
            .job_dir
            .join(job_id)
            .join(format!("file_{index}"))
    }

    fn render_path(&self, job_id: &str, frame: i32) -> PathBuf {
        self.setting
            .render_dir
            .join(job_id)
            .join(format!("render_{frame}.exr"))
    }

    fn log_path(&self, job_id: &str, frame: i32) -> PathBuf {
        self.setting
            .render_dir
            .join(job_id)
            .join(format!("log_{frame}.log"))
    }

    /// Register a new job. It stays `Waiting` until every declared file
    /// arrives and verifies.
    pub fn submit(&self, submission: JobSubmission) -> String {
        let frames = submission
            .frames
            .iter()
            .flat_map(|range| range.frames())
            .collect();
        let mut job = Job::new(frames, submission.files, submission.renderer_version);
        // a submission with no pending files is dispatchable immediately
        job.refresh();
        let id = job.id.clone();
        info!(job_id = %id, frames = job.frames().len(), "job submitted");
        self.lock().insert(id.clone(), job);
        id
    }

    /// Store an uploaded asset after verifying its content hash. A mismatch
    /// is surfaced and the file stays absent - an unreadable or corrupt
    /// required asset must never slip through quietly.
    pub fn receive_file(&self, job_id: &str, index: usize, data: &[u8]) -> Result<JobStatus> {
        let mut jobs = self.lock();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| FarmError::JobNotFound(job_id.to_owned()))?;

        let expected = job.file(index)?.content_hash.clone();
        let actual = hashing::hash_bytes(data);
        if actual != expected {
            return Err(FarmError::HashMismatch {
                path: job.file(index)?.path.clone(),
                expected,
                actual,
            });
        }

        let path = self.file_path(job_id, index);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, data)?;

        let asset = job.file_mut(index)?;
        asset.present = true;
        asset.remapped_path = Some(path);
        job.refresh();
        Ok(job.status)
    }

    pub fn read_file(&self, job_id: &str, index: usize) -> Result<Vec<u8>> {
        let jobs = self.lock();
        let job = jobs
            .get(job_id)
            .ok_or_else(|| FarmError::JobNotFound(job_id.to_owned()))?;
        if !job.file(index)?.present {
            return Err(FarmError::FileNotFound {
                job_id: job_id.to_owned(),
                index,
            });
        }
        Ok(fs::read(self.file_path(job_id, index))?)
    }

    /// Atomically select a `Queued` frame across all jobs and lease it to
    /// `worker`. At most one worker ever holds a given frame.
    pub fn dispatch(&self, worker: Uuid) -> Option<FrameLease> {
        let mut jobs = self.lock();
        for job in jobs.values_mut() {
            if let Some(frame) = job.dispatch_next(worker) {
                info!(job_id = %job.id, frame, %worker, "frame dispatched");
                return Some(FrameLease {
                    job_id: job.id.clone(),
                    frame,
                    renderer_version: job.renderer_version.clone(),
                    files: job.files().to_vec(),
                });
            }
        }
        None
    }

    /// Store a rendered frame and mark it done. Finishing the last frame
    /// finishes the job.
    pub fn frame_done(&self, job_id: &str, frame: i32, image: &[u8]) -> Result<JobStatus> {
        let mut jobs = self.lock();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| FarmError::JobNotFound(job_id.to_owned()))?;
        job.frame_done(frame)?;

        let path = self.render_path(job_id, frame);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, image)?;

        if job.status == JobStatus::Finished {
            info!(job_id, "job finished");
        }
        Ok(job.status)
    }

    /// Record a failed render. Frame local: the rest of the job keeps
    /// progressing.
    pub fn frame_error(&self, job_id: &str, frame: i32, log: &[u8]) -> Result<()> {
        let mut jobs = self.lock();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| FarmError::JobNotFound(job_id.to_owned()))?;
        job.frame_error(frame)?;
        warn!(job_id, frame, "frame reported failed");
        drop(jobs);
        self.append_log(job_id, frame, log)
    }

    pub fn append_log(&self, job_id: &str, frame: i32, text: &[u8]) -> Result<()> {
        {
            let jobs = self.lock();
            let job = jobs
                .get(job_id)
                .ok_or_else(|| FarmError::JobNotFound(job_id.to_owned()))?;
            job.frame(frame).ok_or(FarmError::FrameNotFound {
                job_id: job_id.to_owned(),
                frame,
            })?;
        }
        let path = self.log_path(job_id, frame);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(text)?;
        Ok(())
    }

    pub fn read_log(&self, job_id: &str, frame: i32) -> Result<Vec<u8>> {
        let jobs = self.lock();
        let job = jobs
            .get(job_id)
            .ok_or_else(|| FarmError::JobNotFound(job_id.to_owned()))?;
        job.frame(frame).ok_or(FarmError::FrameNotFound {
            job_id: job_id.to_owned(),
            frame,
        })?;
        drop(jobs);
        Ok(fs::read(self.log_path(job_id, frame))?)
    }

    pub fn read_render(&self, job_id: &str, frame: i32) -> Result<Vec<u8>> {
        let jobs = self.lock();
        let job = jobs
            .get(job_id)
            .ok_or_else(|| FarmError::JobNotFound(job_id.to_owned()))?;
        job.frame(frame).ok_or(FarmError::FrameNotFound {
            job_id: job_id.to_owned(),
            frame,
        })?;
        drop(jobs);
        Ok(fs::read(self.render_path(job_id, frame))?)
    }

    /// Zip of every rendered frame, only once the job finished.
    pub fn result_archive(&self, job_id: &str) -> Result<Vec<u8>> {
        let frames: Vec<i32> = {
            let jobs = self.lock();
            let job = jobs
                .get(job_id)
                .ok_or_else(|| FarmError::JobNotFound(job_id.to_owned()))?;
            if job.status != JobStatus::Finished {
                return Err(FarmError::ResultNotReady(job_id.to_owned()));
            }
            job.frames().iter().map(|f| f.number).collect()
        };

        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for frame in frames {
            let image = fs::read(self.render_path(job_id, frame))?;
            writer.start_file(format!("render_{job_id}_{frame}.exr"), options)?;
            writer.write_all(&image)?;
        }
        let cursor = writer.finish()?;
        Ok(cursor.into_inner())
    }

    pub fn pause(&self, job_id: &str) -> Result<JobStatus> {
        let mut jobs = self.lock();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| FarmError::JobNotFound(job_id.to_owned()))?;
        job.pause();
        Ok(job.status)
    }

    pub fn resume(&self, job_id: &str) -> Result<JobStatus> {
        let mut jobs = self.lock();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| FarmError::JobNotFound(job_id.to_owned()))?;
        job.resume();
        Ok(job.status)
    }

    /// Operator retry of a frame stuck in `Error`.
    pub fn reset_frame(&self, job_id: &str, frame: i32) -> Result<()> {
        let mut jobs = self.lock();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| FarmError::JobNotFound(job_id.to_owned()))?;
        job.reset_frame(frame)
    }

    /// Requeue a frame whose worker went silent past its deadline.
    pub fn expire_lease(&self, job_id: &str, frame: i32) -> Result<bool> {
        let mut jobs = self.lock();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| FarmError::JobNotFound(job_id.to_owned()))?;
        Ok(job.expire_lease(frame))
    }

    pub fn status(&self, job_id: &str) -> Result<JobStatus> {
        let jobs = self.lock();
        let job = jobs
            .get(job_id)
            .ok_or_else(|| FarmError::JobNotFound(job_id.to_owned()))?;
        Ok(job.status)
    }

    /// Full snapshot of a job for status reporting.
    pub fn snapshot(&self, job_id: &str) -> Result<Job> {
        let jobs = self.lock();
        jobs.get(job_id)
            .cloned()
            .ok_or_else(|| FarmError::JobNotFound(job_id.to_owned()))
    }

    /// Explicit purge: forget the job and delete its storage.
    pub fn cancel(&self, job_id: &str) -> Result<()> {
        let mut jobs = self.lock();
        jobs.remove(job_id)
            .ok_or_else(|| FarmError::JobNotFound(job_id.to_owned()))?;
        drop(jobs);
        let _ = fs::remove_dir_all(self.setting.job_dir.join(job_id));
        let _ = fs::remove_dir_all(self.setting.render_dir.join(job_id));
        info!(job_id, "job cancelled and purged");
        Ok(())
    }
}

use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::error::{FarmError, Result};
use super::file_asset::FileAsset;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Submitted but not all data has been entered yet.
    Waiting,
    /// Paused by user, reversible.
    Paused,
    /// Every frame rendered, terminal.
    Finished,
    /// Ready to be dispatched.
    Queued,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Waiting => write!(f, "Waiting"),
            JobStatus::Paused => write!(f, "Paused"),
            JobStatus::Finished => write!(f, "Finished"),
            JobStatus::Queued => write!(f, "Queued"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameStatus {
    Queued,
    Dispatched,
    Done,
    Error,
}

impl fmt::Display for FrameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameStatus::Queued => write!(f, "Queued"),
            FrameStatus::Dispatched => write!(f, "Dispatched"),
            FrameStatus::Done => write!(f, "Done"),
            FrameStatus::Error => write!(f, "Error"),
        }
    }
}

/// One renderable unit within a job, individually dispatched and tracked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub number: i32,
    pub status: FrameStatus,
    /// Worker holding the lease. Only meaningful while `Dispatched`.
    pub assigned: Option<Uuid>,
}

impl Frame {
    fn new(number: i32) -> Self {
        Self {
            number,
            status: FrameStatus::Queued,
            assigned: None,
        }
    }
}

/// A unit of rendering work: frames plus the asset files required to render
/// them. This struct owns the status transition rules; locking against
/// concurrent dispatch belongs to the `JobManager` that holds the table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    frames: Vec<Frame>,
    files: Vec<FileAsset>,
    /// Renderer release this scene was authored against.
    pub renderer_version: Version,
}

impl Job {
    /// Create a new job in `Waiting`. Frame insertion order is frame number
    /// order regardless of the order submitted.
    pub fn new(frames: Vec<i32>, files: Vec<FileAsset>, renderer_version: Version) -> Self {
        let mut numbers = frames;
        numbers.sort_unstable();
        numbers.dedup();
        Self {
            id: Uuid::new_v4().to_string(),
            status: JobStatus::Waiting,
            frames: numbers.into_iter().map(Frame::new).collect(),
            files,
            renderer_version,
        }
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn files(&self) -> &[FileAsset] {
        &self.files
    }

    pub fn frame(&self, number: i32) -> Option<&Frame> {
        self.frames.iter().find(|f| f.number == number)
    }

    pub fn file(&self, index: usize) -> Result<&FileAsset> {
        self.files.get(index).ok_or_else(|| FarmError::FileNotFound {
            job_id: self.id.clone(),
            index,
        })
    }

    pub fn file_mut(&mut self, index: usize) -> Result<&mut FileAsset> {
        let id = self.id.clone();
        self.files
            .get_mut(index)
            .ok_or(FarmError::FileNotFound { job_id: id, index })
    }

    fn frame_mut(&mut self, number: i32) -> Result<&mut Frame> {
        let id = self.id.clone();
        self.frames
            .iter_mut()
            .find(|f| f.number == number)
            .ok_or(FarmError::FrameNotFound {
                job_id: id,
                frame: number,
            })
    }

    pub fn files_present(&self) -> bool {
        self.files.iter().all(|f| f.present)
    }

    fn has_dispatchable_frame(&self) -> bool {
        self.frames.iter().any(|f| f.status == FrameStatus::Queued)
    }

    /// Re-derive the job status from file and frame state. `Waiting` becomes
    /// `Queued` once every file is present and some frame can be handed out;
    /// `Queued` becomes `Finished` once every frame is `Done`. Paused jobs
    /// stay paused until an explicit resume.
    pub fn refresh(&mut self) {
        match self.status {
            JobStatus::Waiting => {
                if self.files_present() && self.has_dispatchable_frame() {
                    self.status = JobStatus::Queued;
                }
            }
            JobStatus::Queued => {
                if !self.frames.is_empty()
                    && self.frames.iter().all(|f| f.status == FrameStatus::Done)
                {
                    self.status = JobStatus::Finished;
                }
            }
            JobStatus::Paused | JobStatus::Finished => {}
        }
    }

    /// Explicit user pause. No-op once finished.
    pub fn pause(&mut self) {
        if matches!(self.status, JobStatus::Waiting | JobStatus::Queued) {
            self.status = JobStatus::Paused;
        }
    }

    /// Undo a pause, falling back to whichever of `Waiting`/`Queued` the
    /// file and frame state currently justifies.
    pub fn resume(&mut self) {
        if self.status == JobStatus::Paused {
            self.status = JobStatus::Waiting;
            self.refresh();
        }
    }

    /// Hand the first dispatchable frame to `worker`. Returns the frame
    /// number, or `None` when the job has nothing to give out. The caller
    /// must hold the job table lock so selection and transition are atomic.
    pub fn dispatch_next(&mut self, worker: Uuid) -> Option<i32> {
        if self.status != JobStatus::Queued {
            return None;
        }
        let frame = self
            .frames
            .iter_mut()
            .find(|f| f.status == FrameStatus::Queued)?;
        frame.status = FrameStatus::Dispatched;
        frame.assigned = Some(worker);
        Some(frame.number)
    }

    /// Worker reported a rendered frame. Only a `Dispatched` frame may
    /// complete; in particular `Error` never auto-transitions to `Done`.
    pub fn frame_done(&mut self, number: i32) -> Result<()> {
        let id = self.id.clone();
        let frame = self.frame_mut(number)?;
        if frame.status != FrameStatus::Dispatched {
            return Err(FarmError::InvalidFrameTransition {
                job_id: id,
                frame: number,
                from: frame.status,
                to: FrameStatus::Done,
            });
        }
        frame.status = FrameStatus::Done;
        frame.assigned = None;
        self.refresh();
        Ok(())
    }

    /// Worker reported a failed render. Errors are frame local - the job
    /// stays `Queued` so the remaining frames keep progressing.
    pub fn frame_error(&mut self, number: i32) -> Result<()> {
        let id = self.id.clone();
        let frame = self.frame_mut(number)?;
        if frame.status != FrameStatus::Dispatched {
            return Err(FarmError::InvalidFrameTransition {
                job_id: id,
                frame: number,
                from: frame.status,
                to: FrameStatus::Error,
            });
        }
        frame.status = FrameStatus::Error;
        frame.assigned = None;
        Ok(())
    }

    /// Operator retry of a failed frame.
    pub fn reset_frame(&mut self, number: i32) -> Result<()> {
        let id = self.id.clone();
        let frame = self.frame_mut(number)?;
        if frame.status != FrameStatus::Error {
            return Err(FarmError::InvalidFrameTransition {
                job_id: id,
                frame: number,
                from: frame.status,
                to: FrameStatus::Queued,
            });
        }
        frame.status = FrameStatus::Queued;
        Ok(())
    }

    /// Lease expiry or worker failure: put the frame back in the queue.
    /// Returns whether the frame actually held a lease - expiring a frame
    /// that already completed is a harmless race, not an error.
    pub fn expire_lease(&mut self, number: i32) -> bool {
        match self.frames.iter_mut().find(|f| f.number == number) {
            Some(frame) if frame.status == FrameStatus::Dispatched => {
                frame.status = FrameStatus::Queued;
                frame.assigned = None;
                true
            }
            _ => false,
        }
    }
}

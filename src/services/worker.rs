use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::error::{FarmError, Result};
use crate::services::backoff::BackoffTimer;
use crate::services::connection::Connection;
use crate::services::hashing;
use crate::services::job_manager::{DispatchRequest, FrameLease};
use crate::services::path_remap;
use crate::services::urls;

/// What a render run hands back for delivery to the master.
pub struct RenderOutput {
    pub image: Vec<u8>,
    pub log: String,
}

/// Seam to the external renderer process. The farm core never spawns the
/// renderer itself; hosts plug in the subprocess shim, tests plug in a
/// mock.
pub trait Renderer {
    fn render(&self, scene: &Path, frame: i32) -> Result<RenderOutput>;
}

/// A slave node session: polls the master for frame leases, materializes
/// job assets locally, renders, and reports results back.
pub struct WorkerClient {
    id: Uuid,
    conn: Connection,
    work_dir: PathBuf,
    backoff: BackoffTimer,
}

impl WorkerClient {
    pub fn new(conn: Connection, work_dir: PathBuf) -> Self {
        Self::with_backoff(conn, work_dir, BackoffTimer::new(5, 5, 20))
    }

    pub fn with_backoff(conn: Connection, work_dir: PathBuf, backoff: BackoffTimer) -> Self {
        Self {
            id: Uuid::new_v4(),
            conn,
            work_dir,
            backoff,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Ask the master for work. `None` when nothing is dispatchable.
    pub fn request_frame(&self) -> Result<Option<FrameLease>> {
        self.conn
            .post_json("/dispatch", &DispatchRequest { worker: self.id })
    }

    /// Download and verify every asset of the lease, placing each one in
    /// the job-local tree. Returns the local paths in file-index order; the
    /// scene file is index 0 by submission convention.
    pub fn fetch_assets(&self, lease: &FrameLease) -> Result<Vec<PathBuf>> {
        let prefix_dir = self.work_dir.join(&lease.job_id);
        fs::create_dir_all(&prefix_dir)?;

        // the submitter's scene directory is the prefix to strip, so
        // dependency paths keep their layout relative to the scene
        let prefix_path = lease
            .files
            .first()
            .and_then(|asset| asset.path.parent())
            .map(|parent| parent.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut local = Vec::with_capacity(lease.files.len());
        for (index, asset) in lease.files.iter().enumerate() {
            let data = self
                .conn
                .get_bytes(&urls::file_url(&lease.job_id, index))?;
            let actual = hashing::hash_bytes(&data);
            if actual != asset.content_hash {
                return Err(FarmError::HashMismatch {
                    path: asset.path.clone(),
                    expected: asset.content_hash.clone(),
                    actual,
                });
            }

            let source = asset.path.to_string_lossy();
            // force: the authoritative bytes just came from the master
            let target = path_remap::remap(&prefix_dir, &source, &prefix_path, true)?;
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, &data)?;
            local.push(target);
        }
        Ok(local)
    }

    /// Deliver a rendered frame; receipt is what marks the frame done on
    /// the master. The log rides along separately.
    pub fn report_done(&self, lease: &FrameLease, output: &RenderOutput) -> Result<()> {
        if !output.log.is_empty() {
            self.conn
                .post_bytes(&urls::log_url(&lease.job_id, lease.frame), output.log.as_bytes())?;
        }
        self.conn
            .post_bytes(&urls::render_url(&lease.job_id, lease.frame), &output.image)?;
        Ok(())
    }

    pub fn report_error(&self, lease: &FrameLease, message: &str) -> Result<()> {
        self.conn
            .post_bytes(&urls::error_url(&lease.job_id, lease.frame), message.as_bytes())?;
        Ok(())
    }

    /// Poll loop: lease, fetch, render, report. Backoff widens while the
    /// master has nothing for us or is unreachable, and resets the moment
    /// work arrives; `cancel` is honored within one backoff unit.
    pub fn run(&mut self, renderer: &dyn Renderer, cancel: &AtomicBool) -> Result<()> {
        while !cancel.load(Ordering::Relaxed) {
            let lease = match self.request_frame() {
                Ok(lease) => lease,
                Err(err @ FarmError::Connection(_)) => {
                    warn!("master unreachable: {err}");
                    self.backoff.sleep(|| cancel.load(Ordering::Relaxed));
                    continue;
                }
                Err(err) => return Err(err),
            };

            let Some(lease) = lease else {
                self.backoff.sleep(|| cancel.load(Ordering::Relaxed));
                continue;
            };
            self.backoff.reset();
            info!(job_id = %lease.job_id, frame = lease.frame, "frame leased");

            let scene = match self.fetch_assets(&lease) {
                Ok(paths) => match paths.into_iter().next() {
                    Some(scene) => scene,
                    None => {
                        self.report_error(&lease, "job carries no scene file")?;
                        continue;
                    }
                },
                Err(err) => {
                    warn!(job_id = %lease.job_id, "asset fetch failed: {err}");
                    self.report_error(&lease, &err.to_string())?;
                    continue;
                }
            };

            match renderer.render(&scene, lease.frame) {
                Ok(output) => self.report_done(&lease, &output)?,
                Err(err) => self.report_error(&lease, &err.to_string())?,
            }
        }
        Ok(())
    }
}

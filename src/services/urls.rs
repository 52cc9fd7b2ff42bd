//! Deterministic artifact addresses, keyed by job id plus frame number or
//! file index. Job ids are opaque uuid strings, so these stay collision
//! free for the lifetime of the job.

/// Asset file upload/download address.
pub fn file_url(job_id: &str, file_index: usize) -> String {
    format!("/file_{job_id}_{file_index}")
}

/// Per frame render log.
pub fn log_url(job_id: &str, frame_number: i32) -> String {
    format!("/log_{job_id}_{frame_number}.log")
}

/// Archive of every rendered frame, available once the job finished.
pub fn result_url(job_id: &str) -> String {
    format!("/result_{job_id}.zip")
}

/// One rendered frame.
pub fn render_url(job_id: &str, frame_number: i32) -> String {
    format!("/render_{job_id}_{frame_number}.exr")
}

pub fn cancel_url(job_id: &str) -> String {
    format!("/cancel_{job_id}")
}

pub fn status_url(job_id: &str) -> String {
    format!("/status_{job_id}")
}

/// Worker report of a failed render.
pub fn error_url(job_id: &str, frame_number: i32) -> String {
    format!("/error_{job_id}_{frame_number}")
}

/// A request path resolved back into a typed artifact reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactPath {
    File { job_id: String, index: usize },
    Log { job_id: String, frame: i32 },
    Result { job_id: String },
    Render { job_id: String, frame: i32 },
    Cancel { job_id: String },
    Status { job_id: String },
    FrameError { job_id: String, frame: i32 },
}

fn split_job_frame(rest: &str) -> Option<(String, i32)> {
    let (job_id, frame) = rest.rsplit_once('_')?;
    if job_id.is_empty() {
        return None;
    }
    Some((job_id.to_owned(), frame.parse().ok()?))
}

/// Parse a request path into its artifact reference, `None` for anything
/// outside the address scheme.
pub fn parse(path: &str) -> Option<ArtifactPath> {
    let rest = path.strip_prefix('/')?;
    if let Some(rest) = rest.strip_prefix("file_") {
        let (job_id, index) = rest.rsplit_once('_')?;
        if job_id.is_empty() {
            return None;
        }
        Some(ArtifactPath::File {
            job_id: job_id.to_owned(),
            index: index.parse().ok()?,
        })
    } else if let Some(rest) = rest
        .strip_prefix("log_")
        .and_then(|r| r.strip_suffix(".log"))
    {
        let (job_id, frame) = split_job_frame(rest)?;
        Some(ArtifactPath::Log { job_id, frame })
    } else if let Some(rest) = rest
        .strip_prefix("result_")
        .and_then(|r| r.strip_suffix(".zip"))
    {
        (!rest.is_empty()).then(|| ArtifactPath::Result {
            job_id: rest.to_owned(),
        })
    } else if let Some(rest) = rest
        .strip_prefix("render_")
        .and_then(|r| r.strip_suffix(".exr"))
    {
        let (job_id, frame) = split_job_frame(rest)?;
        Some(ArtifactPath::Render { job_id, frame })
    } else if let Some(rest) = rest.strip_prefix("cancel_") {
        (!rest.is_empty()).then(|| ArtifactPath::Cancel {
            job_id: rest.to_owned(),
        })
    } else if let Some(rest) = rest.strip_prefix("status_") {
        (!rest.is_empty()).then(|| ArtifactPath::Status {
            job_id: rest.to_owned(),
        })
    } else if let Some(rest) = rest.strip_prefix("error_") {
        let (job_id, frame) = split_job_frame(rest)?;
        Some(ArtifactPath::FrameError { job_id, frame })
    } else {
        None
    }
}

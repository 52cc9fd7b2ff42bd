use assert_matches::assert_matches;
use axum::routing::get;
use axum::Router;
use semver::Version;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use netfarm::models::error::FarmError;
use netfarm::models::file_asset::FileAsset;
use netfarm::models::frame_range::FrameRange;
use netfarm::models::job::JobStatus;
use netfarm::models::settings::{ClientSettings, ServerSetting};
use netfarm::services::backoff::BackoffTimer;
use netfarm::services::connection::{connect, Connection, TimeoutPolicy};
use netfarm::services::hashing;
use netfarm::services::job_manager::{JobManager, JobSubmission};
use netfarm::services::master::{self, SubmitResponse};
use netfarm::services::reporting::{Reporter, Severity};
use netfarm::services::urls;
use netfarm::services::worker::{Renderer, RenderOutput, WorkerClient};

// spin the router up on a background runtime; the thread lives for the
// rest of the test process
fn serve_router(router: Router) -> SocketAddr {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let listener = rt
        .block_on(tokio::net::TcpListener::bind("127.0.0.1:0"))
        .unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        rt.block_on(async move { axum::serve(listener, router).await })
            .unwrap();
    });
    addr
}

fn start_master(manager: Arc<JobManager>) -> SocketAddr {
    serve_router(master::router(manager))
}

fn farm_manager() -> (Arc<JobManager>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let setting = ServerSetting {
        job_dir: dir.path().join("jobs"),
        render_dir: dir.path().join("renders"),
    };
    (Arc::new(JobManager::new(setting).unwrap()), dir)
}

fn settings_for(addr: SocketAddr) -> ClientSettings {
    ClientSettings {
        server_address: addr.ip().to_string(),
        server_port: addr.port(),
        use_ssl: false,
        connect_timeout_secs: 5,
    }
}

fn open_connection(addr: SocketAddr) -> Connection {
    let policy = TimeoutPolicy::default();
    connect(&settings_for(addr), &Reporter::Propagate, false, &policy)
        .unwrap()
        .expect("handshake should pass against our own master")
}

/// Renders by echoing the scene bytes plus the frame number.
struct EchoRenderer;

impl Renderer for EchoRenderer {
    fn render(&self, scene: &Path, frame: i32) -> netfarm::models::error::Result<RenderOutput> {
        let scene_bytes = std::fs::read(scene)?;
        let mut image = scene_bytes;
        image.extend_from_slice(format!(" frame {frame}").as_bytes());
        Ok(RenderOutput {
            image,
            log: format!("rendered frame {frame}\n"),
        })
    }
}

fn fetch_status(conn: &Connection, job_id: &str) -> JobStatus {
    let body = conn.get_string(&urls::status_url(job_id)).unwrap();
    serde_json::from_str(&body).unwrap()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("netfarm=debug")
        .try_init();
}

#[test]
fn end_to_end_submit_render_and_fetch_result() {
    init_tracing();
    let (manager, _dir) = farm_manager();
    let addr = start_master(manager);
    let conn = open_connection(addr);

    let scene = b"scene bytes";
    let submission = JobSubmission {
        frames: vec![FrameRange::Section { start: 0, end: 2 }],
        files: vec![FileAsset::new(
            "/projects/shot/scene.blend",
            hashing::hash_bytes(scene),
        )],
        renderer_version: Version::new(4, 1, 0),
    };
    let response: SubmitResponse = conn.post_json("/job", &submission).unwrap().unwrap();
    let job_id = response.id;
    assert_eq!(fetch_status(&conn, &job_id), JobStatus::Waiting);

    // corrupt upload is refused, job stays waiting
    let status = conn.put_bytes(&urls::file_url(&job_id, 0), b"garbage");
    assert_matches!(status, Err(FarmError::Connection(_)));
    assert_eq!(fetch_status(&conn, &job_id), JobStatus::Waiting);

    // real upload queues the job
    assert_eq!(conn.put_bytes(&urls::file_url(&job_id, 0), scene).unwrap(), 200);
    assert_eq!(fetch_status(&conn, &job_id), JobStatus::Queued);

    // one worker chews through all three frames
    let work_dir = tempfile::tempdir().unwrap();
    let worker_conn = open_connection(addr);
    let worker = WorkerClient::new(worker_conn, work_dir.path().to_path_buf());
    for _ in 0..3 {
        let lease = worker.request_frame().unwrap().expect("a queued frame");
        assert_eq!(lease.job_id, job_id);
        let assets = worker.fetch_assets(&lease).unwrap();
        assert_eq!(std::fs::read(&assets[0]).unwrap(), scene);
        let output = EchoRenderer.render(&assets[0], lease.frame).unwrap();
        worker.report_done(&lease, &output).unwrap();
    }
    assert!(worker.request_frame().unwrap().is_none());
    assert_eq!(fetch_status(&conn, &job_id), JobStatus::Finished);

    // artifacts are addressable now
    let log = conn.get_bytes(&urls::log_url(&job_id, 1)).unwrap();
    assert_eq!(log, b"rendered frame 1\n");
    let render = conn.get_bytes(&urls::render_url(&job_id, 2)).unwrap();
    assert_eq!(render, b"scene bytes frame 2");

    let archive = conn.get_bytes(&urls::result_url(&job_id)).unwrap();
    let mut zip = zip::ZipArchive::new(std::io::Cursor::new(archive)).unwrap();
    assert_eq!(zip.len(), 3);
    assert!(zip.by_name(&format!("render_{job_id}_0.exr")).is_ok());

    // purge
    assert_eq!(conn.post_bytes(&urls::cancel_url(&job_id), b"").unwrap(), 200);
    assert_matches!(
        conn.get_string(&urls::status_url(&job_id)),
        Err(FarmError::Connection(_))
    );
}

#[test]
fn worker_poll_loop_drains_a_job() {
    let (manager, _dir) = farm_manager();
    let addr = start_master(Arc::clone(&manager));

    let work_dir = tempfile::tempdir().unwrap();
    let mut worker = WorkerClient::with_backoff(
        open_connection(addr),
        work_dir.path().to_path_buf(),
        BackoffTimer::with_unit(1, 1, 2, Duration::from_millis(5)),
    );

    let cancel = Arc::new(AtomicBool::new(false));
    let worker_cancel = Arc::clone(&cancel);
    let handle = std::thread::spawn(move || worker.run(&EchoRenderer, &worker_cancel));

    // submit after the worker already started polling
    let scene = b"late scene";
    let job_id = manager.submit(JobSubmission {
        frames: vec![FrameRange::Single(7)],
        files: vec![FileAsset::new("scene.blend", hashing::hash_bytes(scene))],
        renderer_version: Version::new(4, 1, 0),
    });
    manager.receive_file(&job_id, 0, scene).unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    while manager.status(&job_id).unwrap() != JobStatus::Finished {
        assert!(Instant::now() < deadline, "worker never finished the job");
        std::thread::sleep(Duration::from_millis(10));
    }

    cancel.store(true, Ordering::Relaxed);
    handle.join().unwrap().unwrap();
    assert_eq!(manager.read_render(&job_id, 7).unwrap(), b"late scene frame 7");
}

#[test]
fn concurrent_http_dispatch_hands_out_unique_frames() {
    let (manager, _dir) = farm_manager();
    let addr = start_master(manager);
    let conn = open_connection(addr);

    let submission = JobSubmission {
        frames: vec![FrameRange::Section { start: 1, end: 8 }],
        files: vec![],
        renderer_version: Version::new(4, 1, 0),
    };
    let response: SubmitResponse = conn.post_json("/job", &submission).unwrap().unwrap();
    let job_id = response.id;
    assert_eq!(fetch_status(&conn, &job_id), JobStatus::Queued);

    let mut handles = Vec::new();
    for _ in 0..8 {
        handles.push(std::thread::spawn(move || {
            let worker = WorkerClient::new(open_connection(addr), std::env::temp_dir());
            let mut frames = Vec::new();
            while let Some(lease) = worker.request_frame().unwrap() {
                frames.push(lease.frame);
            }
            frames
        }));
    }
    let mut leased: Vec<i32> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    leased.sort_unstable();
    // 8 queued frames, every one leased exactly once across all workers
    assert_eq!(leased, vec![1, 2, 3, 4, 5, 6, 7, 8]);
}

#[test]
fn handshake_rejects_a_version_drifted_master() {
    let addr = serve_router(Router::new().route("/version", get(|| async { "9.9.9" })));

    // headless: the mismatch propagates
    let policy = TimeoutPolicy::default();
    let result = connect(&settings_for(addr), &Reporter::Propagate, false, &policy);
    assert_matches!(result, Err(FarmError::VersionMismatch { .. }));

    // embedded: the sink observes it and the call degrades to None
    let seen: Arc<Mutex<Vec<(Severity, String)>>> = Arc::default();
    let record = Arc::clone(&seen);
    let reporter = Reporter::sink(move |severity, message: &str| {
        record.lock().unwrap().push((severity, message.to_owned()));
    });
    let conn = connect(&settings_for(addr), &reporter, false, &policy).unwrap();
    assert!(conn.is_none());
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, Severity::Error);
    assert!(seen[0].1.contains("version"));
}

#[test]
fn unknown_master_address_reports_connection_error() {
    // a port nothing listens on
    let settings = ClientSettings {
        server_address: "127.0.0.1".to_owned(),
        server_port: 1,
        use_ssl: false,
        connect_timeout_secs: 1,
    };
    let policy = TimeoutPolicy::default();
    let result = connect(&settings, &Reporter::Propagate, false, &policy);
    assert_matches!(result, Err(FarmError::Connection(_)));
}

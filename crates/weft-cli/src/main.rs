use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use serde::Deserialize;
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use weft_core::domain::{Data, RuntimeExtras, WorkId, WorkResult, WorkState, WorkerError};
use weft_core::ports::{ExecutionListener, Scheduler};
use weft_core::{
    Configuration, InMemoryWorkStore, Processor, TypedWorker, WorkInput, WorkRecord, Worker,
    WorkerParameters,
};

/// Runs a small fetch -> resize -> upload -> announce chain and a periodic
/// heartbeat on the in-memory store, then prints the final states.
#[derive(Debug, Parser)]
#[command(name = "weft", version, about)]
struct Args {
    /// Times the resize step asks to be retried before it succeeds
    #[arg(long, default_value_t = 1)]
    flaky: u32,

    /// Heartbeat periods to run before the periodic job is cancelled
    #[arg(long, default_value_t = 3)]
    heartbeats: u32,

    /// Heartbeat interval in milliseconds
    #[arg(long, default_value_t = 200)]
    interval_ms: u64,

    /// Make the upload fail permanently (the announce step fails with it)
    #[arg(long)]
    fail_upload: bool,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Deserialize)]
struct Fetch {
    url: String,
}

impl WorkInput for Fetch {
    const WORKER_TYPE: &'static str = "demo.fetch.v1";
}

struct FetchWorker;

#[async_trait]
impl TypedWorker<Fetch> for FetchWorker {
    async fn work(&self, input: Fetch, _params: &WorkerParameters) -> Result<WorkResult, WorkerError> {
        let bytes = input.url.len() as u64 * 1024;
        info!(url = %input.url, bytes, "fetched");
        Ok(WorkResult::Success(Data::new().with("bytes", bytes)))
    }
}

#[derive(Debug, Deserialize)]
struct Resize {
    bytes: u64,
}

impl WorkInput for Resize {
    const WORKER_TYPE: &'static str = "demo.resize.v1";
}

struct ResizeWorker {
    remaining_retries: AtomicU32,
}

#[async_trait]
impl TypedWorker<Resize> for ResizeWorker {
    async fn work(&self, input: Resize, params: &WorkerParameters) -> Result<WorkResult, WorkerError> {
        let left = self.remaining_retries.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_retries.fetch_sub(1, Ordering::Relaxed);
            warn!(attempt = params.run_attempt_count, left, "resize backend busy, asking for a retry");
            return Ok(WorkResult::Retry);
        }
        Ok(WorkResult::Success(Data::new().with("bytes", input.bytes / 2)))
    }
}

#[derive(Debug, Deserialize)]
struct Upload {
    bytes: u64,
}

impl WorkInput for Upload {
    const WORKER_TYPE: &'static str = "demo.upload.v1";
}

struct UploadWorker {
    fail: bool,
}

#[async_trait]
impl TypedWorker<Upload> for UploadWorker {
    async fn work(&self, input: Upload, _params: &WorkerParameters) -> Result<WorkResult, WorkerError> {
        if self.fail {
            return Ok(WorkResult::Failure(Some(
                Data::new().with("error", "bucket does not exist"),
            )));
        }
        Ok(WorkResult::Success(
            Data::new().with("location", format!("mem://uploads/{}", input.bytes)),
        ))
    }
}

#[derive(Debug, Deserialize)]
struct Announce {
    location: String,
}

impl WorkInput for Announce {
    const WORKER_TYPE: &'static str = "demo.announce.v1";
}

struct AnnounceWorker;

#[async_trait]
impl TypedWorker<Announce> for AnnounceWorker {
    async fn work(&self, input: Announce, _params: &WorkerParameters) -> Result<WorkResult, WorkerError> {
        info!(location = %input.location, "upload announced");
        Ok(WorkResult::Success(Data::new().with("sent", true)))
    }
}

const HEARTBEAT: &str = "demo.heartbeat.v1";

struct HeartbeatWorker {
    runs: Arc<AtomicU32>,
}

#[async_trait]
impl Worker for HeartbeatWorker {
    async fn start_work(&self, params: WorkerParameters) -> Result<WorkResult, WorkerError> {
        let n = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        info!(work_id = %params.id, n, "heartbeat");
        Ok(WorkResult::success())
    }
}

/// Wakes the dispatch loop whenever the engine commits a transition.
#[derive(Default)]
struct WakeScheduler {
    wake: Notify,
}

impl Scheduler for WakeScheduler {
    fn on_work_potentially_eligible(&self) {
        self.wake.notify_one();
    }
}

struct LogListener;

impl ExecutionListener for LogListener {
    fn on_executed(&self, id: WorkId, successful: bool, needs_reschedule: bool) {
        debug!(work_id = %id, successful, needs_reschedule, "executed");
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    // (A) Worker の登録と Configuration の構築
    let heartbeat_runs = Arc::new(AtomicU32::new(0));
    let config = Configuration::builder()
        .register::<Fetch, _>(FetchWorker)?
        .register::<Resize, _>(ResizeWorker {
            remaining_retries: AtomicU32::new(args.flaky),
        })?
        .register::<Upload, _>(UploadWorker {
            fail: args.fail_upload,
        })?
        .register::<Announce, _>(AnnounceWorker)?
        .register_worker(HEARTBEAT, HeartbeatWorker {
            runs: Arc::clone(&heartbeat_runs),
        })?
        .expect_workers(&[
            Fetch::WORKER_TYPE,
            Resize::WORKER_TYPE,
            Upload::WORKER_TYPE,
            Announce::WORKER_TYPE,
            HEARTBEAT,
        ])
        .build()
        .context("building configuration")?;

    // (B) 作業の投入（チェーン + 周期ジョブ）
    let store = InMemoryWorkStore::new();
    let fetch = store
        .insert_work(
            WorkRecord::new(Fetch::WORKER_TYPE)
                .with_input(Data::new().with("url", "https://example.com/cat.png")),
        )
        .await?;
    let resize = store
        .insert_work(WorkRecord::new(Resize::WORKER_TYPE).with_state(WorkState::Blocked))
        .await?;
    let upload = store
        .insert_work(WorkRecord::new(Upload::WORKER_TYPE).with_state(WorkState::Blocked))
        .await?;
    let announce = store
        .insert_work(WorkRecord::new(Announce::WORKER_TYPE).with_state(WorkState::Blocked))
        .await?;
    store.insert_dependency(resize, fetch).await?;
    store.insert_dependency(upload, resize).await?;
    store.insert_dependency(announce, upload).await?;
    for id in [fetch, resize, upload, announce] {
        store.insert_tag(id, "thumbnail").await?;
    }

    let interval = Duration::from_millis(args.interval_ms);
    let heartbeat = store
        .insert_work(
            WorkRecord::new(HEARTBEAT)
                .periodic(interval)
                .with_period_start_time(config.clock().now()),
        )
        .await?;
    store.insert_tag(heartbeat, "periodic").await?;

    // (C) Processor を起動し、実行可能な作業を拾い続ける
    let scheduler = Arc::new(WakeScheduler::default());
    let processor = Processor::new(
        config.clone(),
        Arc::new(store.clone()),
        vec![scheduler.clone() as Arc<dyn Scheduler>],
    );
    processor.add_listener(Arc::new(LogListener));

    loop {
        if heartbeat_runs.load(Ordering::SeqCst) >= args.heartbeats
            && !processor.is_enqueued(heartbeat)
            && store.cancel_work(heartbeat).await?
        {
            info!("heartbeat limit reached, cancelling periodic work");
        }

        let now = config.clock().now();
        for record in store.records_in_state(WorkState::Enqueued).await {
            if record.period_start_time <= now && !processor.is_enqueued(record.id) {
                processor.start_work(record.id, RuntimeExtras::new())?;
            }
        }

        let counts = store.counts_by_state().await;
        if counts.enqueued + counts.blocked + counts.running == 0 && !processor.has_work() {
            break;
        }
        tokio::select! {
            _ = scheduler.wake.notified() => {}
            _ = tokio::time::sleep(interval / 4) => {}
        }
    }
    processor.wait_idle().await;

    // (D) 結果の表示
    for id in [fetch, resize, upload, announce, heartbeat] {
        if let Some(record) = store.get_record(id).await {
            println!(
                "{:<18} {:<10} attempts={} output={}",
                record.worker_type,
                record.state,
                record.run_attempt_count,
                serde_json::to_string(&record.output)?
            );
        }
    }
    println!(
        "counts: {}",
        serde_json::to_string(&store.counts_by_state().await)?
    );
    Ok(())
}

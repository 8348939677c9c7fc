use anyhow::Context;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use peer_mapper::config::{
    DEFAULT_FLUSH_INTERVAL, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_LIVENESS_TIMEOUT,
    DEFAULT_REASSIGN_BACKOFF, DEFAULT_RPC_TIMEOUT, DEFAULT_STRAGGLER_DELAY,
};
use peer_mapper::job::{JobRequest, WorkerId};
use peer_mapper::mapper::MapRegistry;
use peer_mapper::rpc::{Directory, HttpDirectory, LocalPeer, WorkerRpc, handlers};
use peer_mapper::sink::{self, FileSink};
use peer_mapper::{NodeConfig, WorkerNode, telemetry};

#[derive(Parser, Debug)]
#[command(name = "peer-mapper")]
#[command(version)]
#[command(about = "Master-less worker pool for map-only jobs")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a worker and, with --entry, join an existing pool
    Worker(WorkerArgs),

    /// Serve an input file, submit a job, and collect the results
    Client(ClientArgs),

    /// Poke a running worker
    Ctl {
        /// Base URL of the worker
        #[arg(long, short = 't')]
        target: String,

        #[command(subcommand)]
        action: CtlAction,
    },
}

// =============================================================================
// Worker Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct WorkerArgs {
    /// Worker id; ids are expected to run 1..=n across the pool
    #[arg(long)]
    id: u32,

    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:7001")]
    bind: SocketAddr,

    /// URL peers use to reach this worker (defaults to http://<bind>)
    #[arg(long)]
    addr: Option<String>,

    /// URL of any pool member; omit to start a new pool as its root
    #[arg(long)]
    entry: Option<String>,

    /// Lifeproof period in milliseconds
    #[arg(long, default_value_t = DEFAULT_HEARTBEAT_INTERVAL.as_millis() as u64)]
    heartbeat_ms: u64,

    /// Silence after which a tracked member is declared failed, in milliseconds
    #[arg(long, default_value_t = DEFAULT_LIVENESS_TIMEOUT.as_millis() as u64)]
    liveness_ms: u64,

    /// Wait before the straggler pass, in milliseconds
    #[arg(long, default_value_t = DEFAULT_STRAGGLER_DELAY.as_millis() as u64)]
    straggler_ms: u64,

    /// Retry period while no member is idle, in milliseconds
    #[arg(long, default_value_t = DEFAULT_REASSIGN_BACKOFF.as_millis() as u64)]
    backoff_ms: u64,

    /// Partial-result flush period, in milliseconds
    #[arg(long, default_value_t = DEFAULT_FLUSH_INTERVAL.as_millis() as u64)]
    flush_ms: u64,

    /// Per-call timeout, in milliseconds
    #[arg(long, default_value_t = DEFAULT_RPC_TIMEOUT.as_millis() as u64)]
    rpc_timeout_ms: u64,
}

impl WorkerArgs {
    fn node_config(&self, addr: String) -> NodeConfig {
        NodeConfig::new(WorkerId(self.id), addr)
            .with_heartbeat_interval(Duration::from_millis(self.heartbeat_ms))
            .with_liveness_timeout(Duration::from_millis(self.liveness_ms))
            .with_straggler_delay(Duration::from_millis(self.straggler_ms))
            .with_reassign_backoff(Duration::from_millis(self.backoff_ms))
            .with_flush_interval(Duration::from_millis(self.flush_ms))
            .with_rpc_timeout(Duration::from_millis(self.rpc_timeout_ms))
    }
}

// =============================================================================
// Client Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ClientArgs {
    /// URL of the worker that receives the job
    #[arg(long, short = 'e')]
    entry: String,

    /// Input file, one record per line
    #[arg(long, short = 'i')]
    input: PathBuf,

    /// Directory for the `<split>.out` result files
    #[arg(long, short = 'o', default_value = "output")]
    output: PathBuf,

    /// Requested number of splits
    #[arg(long, short = 'n', default_value = "4")]
    splits: u32,

    /// Registered map function
    #[arg(long, short = 'm', default_value = "word_count")]
    map: String,

    /// Address the sink listens on
    #[arg(long, default_value = "127.0.0.1:7100")]
    bind: SocketAddr,

    /// URL workers use to reach the sink (defaults to http://<bind>)
    #[arg(long)]
    addr: Option<String>,
}

// =============================================================================
// Control Actions
// =============================================================================

#[derive(Subcommand, Debug)]
enum CtlAction {
    /// Print the worker's status report
    Status,
    /// Slow the worker's engine down
    Slow {
        #[arg(long, default_value = "10000")]
        millis: u64,
    },
    FreezeWorker,
    UnfreezeWorker,
    FreezeTracker,
    UnfreezeTracker,
    /// Make the worker leave the pool for good
    Die,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();

    let args = Args::parse();
    match args.command {
        Commands::Worker(args) => run_worker(args).await,
        Commands::Client(args) => run_client(args).await,
        Commands::Ctl { target, action } => run_ctl(target, action).await,
    }
}

async fn run_worker(args: WorkerArgs) -> anyhow::Result<()> {
    let addr = args
        .addr
        .clone()
        .unwrap_or_else(|| format!("http://{}", args.bind));
    let config = args.node_config(addr.clone());
    let rpc_timeout = config.rpc_timeout;

    let directory = HttpDirectory::new(rpc_timeout);
    let registry = MapRegistry::with_builtins();
    tracing::info!("Map functions: {:?}", registry.names());

    let node = WorkerNode::new(config, directory, registry);
    let server_handle: Arc<dyn WorkerRpc> =
        Arc::new(LocalPeer::new(addr, Arc::downgrade(&node), rpc_timeout));
    let app = handlers::router(server_handle);

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("binding {}", args.bind))?;
    tracing::info!(worker_id = %node.id(), "Listening on {}", args.bind);

    let shutdown = node.shutdown_token();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
    });

    node.start();
    match &args.entry {
        Some(entry) => node
            .join_pool(entry)
            .await
            .with_context(|| format!("joining through {}", entry))?,
        None => tracing::info!(worker_id = %node.id(), "Starting a new pool as root"),
    }

    let stopped = node.shutdown_token();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted; leaving the pool");
            node.die().await;
        }
        _ = stopped.cancelled() => {}
    }

    server.await??;
    Ok(())
}

async fn run_client(args: ClientArgs) -> anyhow::Result<()> {
    let addr = args
        .addr
        .clone()
        .unwrap_or_else(|| format!("http://{}", args.bind));

    let file_sink = FileSink::open(addr.clone(), &args.input, args.output.clone())
        .await
        .with_context(|| format!("reading {}", args.input.display()))?;
    let file_size = u32::try_from(file_sink.line_count()).context("input has too many lines")?;

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("binding {}", args.bind))?;
    let app = sink::handlers::router(file_sink.clone());
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Sink server stopped: {}", e);
        }
    });
    tracing::info!("Serving {} lines on {}", file_size, args.bind);

    let directory = HttpDirectory::new(DEFAULT_RPC_TIMEOUT);
    let entry = directory.worker(&args.entry);
    let receipt = entry
        .submit_job(JobRequest {
            file_size,
            n_splits: args.splits,
            client_addr: addr,
            map_name: args.map,
        })
        .await
        .context("submitting job")?;

    println!(
        "Job {} accepted: {} splits over {} members; results in {}",
        receipt.job_id.0,
        receipt.splits,
        receipt.assigned_members,
        file_sink.output_dir().display()
    );
    println!("Serving input until interrupted (Ctrl+C)");

    tokio::signal::ctrl_c().await?;
    Ok(())
}

async fn run_ctl(target: String, action: CtlAction) -> anyhow::Result<()> {
    let directory = HttpDirectory::new(DEFAULT_RPC_TIMEOUT);
    let worker = directory.worker(&target);

    match action {
        CtlAction::Status => {
            let report = worker.status().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        CtlAction::Slow { millis } => worker.slow(Duration::from_millis(millis)).await?,
        CtlAction::FreezeWorker => worker.freeze_worker().await?,
        CtlAction::UnfreezeWorker => worker.unfreeze_worker().await?,
        CtlAction::FreezeTracker => worker.freeze_tracker().await?,
        CtlAction::UnfreezeTracker => worker.unfreeze_tracker().await?,
        CtlAction::Die => worker.die().await?,
    }
    Ok(())
}

//! fizzq CLI: run the submit/poll service with its workers.

use clap::{Parser, Subcommand};
use fizzq::api::{self, ApiState};
use fizzq::broker::MemoryBroker;
use fizzq::config::Config;
use fizzq::dispatch::Dispatcher;
use fizzq::rule::classify;
use fizzq::service::{self, WorkerSet};
use fizzq::status::StatusReader;
use fizzq::store::MemoryStore;
use fizzq::telemetry::{TelemetryConfig, init_telemetry};
use fizzq::worker::Processor;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "fizzq", about = "Asynchronous request/poll work queue")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API and the worker pool against embedded broker and store
    Serve {
        /// Override FIZZQ_BIND
        #[arg(long)]
        bind: Option<std::net::SocketAddr>,
        /// Override FIZZQ_WORKERS
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Print the classification of each input
    Classify {
        #[arg(required = true, allow_negative_numbers = true)]
        inputs: Vec<i64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { bind, workers } => {
            let mut config = Config::from_env()?;
            if let Some(bind) = bind {
                config.bind = bind;
            }
            if let Some(workers) = workers {
                anyhow::ensure!(workers > 0, "--workers must be at least 1");
                config.workers = workers;
            }
            cmd_serve(config).await
        }
        Command::Classify { inputs } => {
            for input in inputs {
                println!("{input}\t{}", classify(input));
            }
            Ok(())
        }
    }
}

async fn cmd_serve(config: Config) -> anyhow::Result<()> {
    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "fizzq".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let broker = MemoryBroker::new();
    broker.create_topic(&config.topic, config.partitions)?;
    let store = Arc::new(MemoryStore::new());

    let shutdown = CancellationToken::new();
    let mut workers = WorkerSet::new();
    for n in 0..config.workers {
        let processor = Processor::new(
            broker.consumer(&config.group_id),
            store.clone(),
            config.worker(),
        );
        let token = shutdown.child_token();
        workers.spawn(async move { (n, processor.run(token).await) });
    }

    let state = ApiState {
        dispatcher: Arc::new(Dispatcher::new(
            store.clone(),
            Arc::new(broker.clone()),
            config.topic.clone(),
        )),
        reader: Arc::new(StatusReader::new(store)),
        retry_after: config.retry_after,
    };
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    let api = tokio::spawn(api::serve(listener, state, shutdown.clone()));

    tokio::spawn(service::wait_for_signal(shutdown.clone()));

    service::supervise(workers, api, shutdown).await?;
    Ok(())
}

// Search river daemon
//
// Declares broker topology, runs backfill workers, seeds account backfills
// and answers search queries from the command line.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use search_river::backfill::BackfillWorker;
use search_river::search::{ResponseFormat, SearchRequest, render, search, split_search_path};
use search_river::{
    AmqpConnector, BrokerClient, Config, ElasticBackend, EntityType, SwiftClient, setup_topology,
    start_backfill,
};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "search-river", version, about = "Keeps a search index in sync with object storage")]
struct Cli {
    /// JSON configuration file; defaults apply when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Declare the river and backfill exchanges and queues
    Setup,
    /// Consume one backfill queue until interrupted
    Worker {
        /// account, container or object
        #[arg(short, long)]
        queue: EntityType,
    },
    /// Seed a backfill of one account
    Backfill {
        #[arg(short, long)]
        account: String,
        /// Compare the index against storage instead of writing it
        #[arg(long)]
        verify: bool,
    },
    /// Run one search, e.g. `search /v1/AUTH_a/photos -p q=cat -p type=object`
    Search {
        /// Request path `/v1/<account>[/<path>]`
        path: String,
        /// Query parameters as key=value
        #[arg(short = 'p', long = "param")]
        params: Vec<String>,
        #[arg(short, long)]
        format: Option<String>,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };
    config.validate()?;
    Ok(config)
}

fn start_broker(config: &Config) -> Result<BrokerClient> {
    Ok(BrokerClient::start(
        config.broker.clone(),
        Arc::new(AmqpConnector),
    )?)
}

fn stop_on_ctrl_c() -> watch::Receiver<bool> {
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        info!("interrupt received, stopping");
        let _ = stop_tx.send(true);
    });
    stop_rx
}

async fn run_worker(config: Config, queue: EntityType) -> Result<()> {
    let broker = start_broker(&config)?;
    let storage = Arc::new(SwiftClient::new(config.storage.clone())?);
    let search = Arc::new(ElasticBackend::new(&config.index)?);

    let mut worker = BackfillWorker::new(queue, broker.clone(), storage, search, &config);
    worker.run(stop_on_ctrl_c()).await;

    broker.stop().await;
    let stats = broker.stats();
    info!(
        delivered = stats.delivered,
        dropped = stats.dropped,
        "publisher drained"
    );
    Ok(())
}

async fn run_search(
    config: Config,
    path: &str,
    params: &[String],
    format: Option<&str>,
) -> Result<()> {
    let mut pairs = Vec::with_capacity(params.len());
    for param in params {
        let Some((key, value)) = param.split_once('=') else {
            bail!("parameter {param:?} is not key=value");
        };
        pairs.push((key, value));
    }

    let (account, search_path) = split_search_path(path, "v1")?;
    let request = SearchRequest::from_query_pairs(account, search_path, pairs)?;
    let backend = ElasticBackend::new(&config.index)?;
    let results = search(&backend, &config.index.search_index_name, request).await?;

    let rendered = render(&results, ResponseFormat::negotiate(format, None))?;
    for (name, value) in &rendered.headers {
        eprintln!("{name}: {value}");
    }
    println!("{}", rendered.body);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Command::Setup => {
            let broker = start_broker(&config)?;
            let result = setup_topology(&broker).await;
            broker.stop().await;
            result?;
        }
        Command::Worker { queue } => run_worker(config, queue).await?,
        Command::Backfill { account, verify } => {
            let broker = start_broker(&config)?;
            let result = start_backfill(&broker, &account, verify).await;
            broker.stop().await;
            result?;
            info!(account = %account, verify, "backfill scheduled");
        }
        Command::Search {
            path,
            params,
            format,
        } => run_search(config, &path, &params, format.as_deref()).await?,
    }
    Ok(())
}

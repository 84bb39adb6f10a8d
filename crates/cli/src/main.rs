use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use decision_service::{
    load_settings, DecisionService, DecisionServiceConfiguration, FileBatchSink, ServiceSettings,
};
use mwt_explore::{Explorer, Policy, TauFirstExplorer};
use prometheus_client::registry::Registry;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "decision-sample",
    version,
    about = "Runs simulated decisions through the decision service"
)]
struct Cli {
    /// Settings file (YAML); built-in defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// App id used when no settings file is given
    #[arg(long, default_value = "decision-sample")]
    app_id: String,

    /// Number of decisions to make
    #[arg(long, default_value_t = 100)]
    decisions: u32,

    /// Exploration budget
    #[arg(long, default_value_t = 20)]
    tau: u64,

    /// Number of actions to choose from
    #[arg(long, default_value_t = 4)]
    actions: u32,

    /// Append batches to this file instead of posting them
    #[arg(long)]
    out: Option<PathBuf>,

    /// Print the Prometheus exposition after the run
    #[arg(long)]
    metrics: bool,
}

/// Simulated request context.
#[derive(Debug, Serialize)]
struct Visit {
    user: String,
    hour: u32,
}

impl Visit {
    fn simulated(i: u32) -> Self {
        Self {
            user: format!("user-{}", i % 17),
            hour: i % 24,
        }
    }

    /// The action this visitor rewards.
    fn preferred(&self, actions: u32) -> u32 {
        self.hour % actions + 1
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    anyhow::ensure!(cli.actions > 0, "--actions must be at least 1");

    let settings = match &cli.config {
        Some(path) => load_settings(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => {
            let mut settings = ServiceSettings::new(cli.app_id.as_str(), "");
            settings.apply_env_overrides();
            settings
        }
    };

    let policy: Arc<dyn Policy<Visit>> = Arc::new(|_: &Visit| vec![1]);
    let explorer: Arc<dyn Explorer<Visit>> =
        Arc::new(TauFirstExplorer::new(policy, cli.tau, cli.actions));
    let config = DecisionServiceConfiguration::new(settings, explorer)?;
    let service = match &cli.out {
        Some(path) => {
            info!(path = %path.display(), "writing batches to file");
            DecisionService::with_sink(config, Arc::new(FileBatchSink::new(path)))?
        }
        None => DecisionService::new(config)?,
    };

    let mut registry = Registry::default();
    service.metrics().register(&mut registry);

    tokio::select! {
        result = simulate(&service, &cli) => result?,
        () = interrupted() => info!("interrupted; flushing pending events"),
    }
    service.flush().await;

    println!(
        "{}",
        serde_json::to_string_pretty(&service.metrics().snapshot())?
    );
    if cli.metrics {
        let mut body = String::new();
        prometheus_client::encoding::text::encode(&mut body, &registry)?;
        print!("{body}");
    }
    Ok(())
}

async fn simulate(service: &DecisionService<Visit>, cli: &Cli) -> anyhow::Result<()> {
    let mut matched = 0u32;
    for i in 0..cli.decisions {
        let key = format!("decision-{i}");
        let visit = Visit::simulated(i);
        let actions = service.choose_action(&key, &visit)?;

        let reward = if actions.first() == Some(&visit.preferred(cli.actions)) {
            matched += 1;
            1.0
        } else {
            0.0
        };
        if !service.report_reward(reward, &key).await {
            warn!(key, "reward was not queued");
        }
    }
    info!(decisions = cli.decisions, matched, "simulation finished");
    Ok(())
}

async fn interrupted() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(%err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

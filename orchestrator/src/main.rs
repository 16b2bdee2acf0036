use std::sync::Arc;

use clap::Command;
use tracing::info;
use tracing_subscriber::EnvFilter;

use signals_env::Config;
use signals_ledger::EvmLedger;
use signals_orchestrator::context::ApplicationContext;
use signals_orchestrator::server::run_server;

fn cli() -> Command {
    Command::new("orchestrator")
        .about("Coordination server for Signals matches and tournaments.")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(Command::new("run").about("Run the orchestrator"))
}

async fn run() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    info!(
        "Chain {} game={} registry={} token={}",
        config.chain_id, config.game_contract, config.registry_contract, config.token_contract
    );

    let ledger = Arc::new(EvmLedger::try_new(&config).await?);
    let (ctx, _signal_loop) = ApplicationContext::start(config, ledger);
    run_server(ctx).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let matches = cli().get_matches();
    match matches.subcommand() {
        Some(("run", _)) => run().await,
        _ => unreachable!(),
    }
}

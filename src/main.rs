use std::sync::Arc;

use bonder::api;
use bonder::chain::{ChainBridge, EvmChainClient};
use bonder::config::Config;
use bonder::db::{self, PgLedgerStore};
use bonder::liquidity::LiquidityState;
use bonder::metrics::Metrics;
use bonder::notifier::Notifier;
use bonder::relay::build_strategy;
use bonder::state::{AppState, BondPolicy, ChainContext, ChainRegistry, SyncStatus};
use bonder::watchers::WatcherManager;
use eyre::eyre;

fn main() -> eyre::Result<()> {
    // Install color-eyre for better error reporting
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> eyre::Result<()> {
    init_logging();

    tracing::info!("Starting bonder node");

    let config = Config::load()?;
    tracing::info!(
        chains = config.chains.len(),
        rank = config.bonder.rank,
        dry_mode = config.bonder.dry_mode,
        "Configuration loaded"
    );

    let pool = db::create_pool(&config.database.url).await?;
    tracing::info!("Database connected");
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");
    let store = Arc::new(PgLedgerStore::new(pool));

    let l1_config = config
        .l1_chain()
        .ok_or_else(|| eyre!("No L1 chain configured"))?;
    let l1_client = Arc::new(EvmChainClient::new(l1_config, &config.bonder.private_key)?);

    let mut contexts = Vec::with_capacity(config.chains.len());
    for chain in &config.chains {
        let client = if chain.chain_id == l1_config.chain_id {
            l1_client.clone()
        } else {
            Arc::new(EvmChainClient::new(chain, &config.bonder.private_key)?)
        };
        let relay = if chain.chain_id == l1_config.chain_id {
            None
        } else {
            build_strategy(chain, l1_client.clone(), client.clone())?
        };
        let client: Arc<dyn ChainBridge> = client;
        contexts.push(ChainContext::new(chain, client, relay)?);
    }
    let chains = Arc::new(ChainRegistry::new(contexts)?);

    let metrics = Arc::new(Metrics::new());
    let notifier = Arc::new(Notifier::new(&config.notifier, "bonder"));
    let state = AppState::new(
        store,
        chains.clone(),
        Arc::new(LiquidityState::new()),
        Arc::new(SyncStatus::new(chains.chain_ids())),
        metrics,
        notifier,
        BondPolicy::from_config(&config.bonder)?,
        config.watchers.clone(),
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(()).await;
    });

    let api_state = state.clone();
    let (bind_address, port) = (config.api.bind_address.clone(), config.api.port);
    tokio::spawn(async move {
        if let Err(e) = api::start_server(&bind_address, port, api_state).await {
            tracing::error!(error = %e, "API server error");
        }
    });

    let result = WatcherManager::new(state).run(shutdown_rx).await;
    if let Err(e) = &result {
        tracing::error!(error = %e, "Watcher manager error");
    }
    tracing::info!("Bonder node stopped");
    result
}

/// Initialize tracing/logging; `LOG_FORMAT=json` switches to JSON lines
fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,bonder=debug"));

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(true))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .with(filter)
            .init();
    }
}

/// Wait for shutdown signals (SIGINT/SIGTERM)
async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}

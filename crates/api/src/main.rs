use std::sync::Arc;

use anyhow::Context;

use posledger_api::config::ApiConfig;
use posledger_infra::event_store::InMemoryEventStore;
use posledger_infra::ledger::{InMemoryMovementLedger, MovementLedger, PostgresMovementLedger};
use posledger_infra::Engine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ApiConfig::from_env().context("invalid configuration")?;
    posledger_observability::init(&config.log);

    let ledger: Arc<dyn MovementLedger> = match config.database_url.as_deref() {
        Some(url) => {
            let ledger = PostgresMovementLedger::connect(url)
                .await
                .context("failed to connect to the ledger database")?;
            ledger
                .ensure_schema()
                .await
                .context("failed to prepare the ledger schema")?;
            tracing::info!("using postgres movement ledger");
            Arc::new(ledger)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; movements are kept in memory only");
            Arc::new(InMemoryMovementLedger::new())
        }
    };

    let engine = Engine::new(config.engine.clone(), Arc::new(InMemoryEventStore::new()), ledger);
    let app = posledger_api::app::build_app(Arc::new(engine));

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(
        addr = %listener.local_addr().context("listener has no local address")?,
        transfer_matching = ?config.engine.transfer_matching,
        "listening"
    );

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

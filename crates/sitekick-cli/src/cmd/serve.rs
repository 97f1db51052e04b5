use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use sitekick_core::store::{Datastore, MemoryStore};
use sitekick_server::mailer::ResendSender;
use sitekick_server::pg::PgStore;
use sitekick_server::AppState;

pub fn run(path: &Path, port: Option<u16>, memory: bool) -> anyhow::Result<()> {
    let config = super::load_config(path)?;
    let port = port.unwrap_or(config.server.port);

    for w in config.validate() {
        tracing::warn!(level = ?w.level, "{}", w.message);
    }

    let sender = Arc::new(ResendSender::from_config(&config.email)?);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let store: Arc<dyn Datastore> = if memory {
            tracing::warn!("using in-memory store; data is lost on exit");
            Arc::new(MemoryStore::new())
        } else {
            Arc::new(
                PgStore::connect(&config.database)
                    .await
                    .context("failed to connect to database")?,
            )
        };

        let state = AppState::new(&config, store, sender);
        sitekick_server::serve(state, port).await
    })
}

use anyhow::Context;
use sitekick_server::pg::PgStore;
use std::path::Path;

pub fn run(path: &Path) -> anyhow::Result<()> {
    let config = super::load_config(path)?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let store = PgStore::connect(&config.database)
            .await
            .context("failed to connect to database")?;
        store.migrate().await?;
        println!("Migrations applied.");
        Ok::<(), anyhow::Error>(())
    })
}

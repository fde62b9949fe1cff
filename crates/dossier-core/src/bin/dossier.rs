use dossier_core::{Config, Pipeline};

/// Run the analysis pipeline as a standalone worker process
fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("dossier_core=info".parse()?),
        )
        .init();

    tracing::info!("Starting dossier pipeline");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let config = Config::load_or_default();
        tracing::info!("Data directory: {:?}", config.data_dir);

        let mut pipeline = Pipeline::start(&config).await?;

        tracing::info!("Pipeline running. Press Ctrl+C to stop.");
        tokio::signal::ctrl_c().await?;

        tracing::info!("Shutting down...");
        pipeline.shutdown().await;
        Ok(())
    })
}

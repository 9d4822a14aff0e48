use cofile_api::setup;
use cofile_core::Config;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = Config::from_env()?;

    // Initialize the application (repositories, services, routes)
    let (state, router) = setup::initialize_app(config.clone()).await?;

    let reaper = state.reaper.clone().start();

    setup::server::start_server(&config, router).await?;

    reaper.abort();
    state.archives.shutdown().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

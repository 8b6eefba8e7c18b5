// This is where we create the default webserver for running the binary
// locally

use anyhow::Result;
use clap::Parser;
use indiseek::application::{application::Application, config::configuration::Configuration};
use std::net::SocketAddr;
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<()> {
    let configuration = Configuration::parse();

    // We get the logging setup first
    Application::install_logging(&configuration);
    debug!("installed logging to local file");

    let application = Application::initialize(configuration).await?;
    info!("indiseek 🔎");
    debug!("initialized application");

    start(application).await
}

async fn start(app: Application) -> Result<()> {
    let bind = SocketAddr::new(app.config.host.parse()?, app.config.port);
    info!(%bind, "starting webserver");

    let router = indiseek::webserver::router(app);
    axum::Server::bind(&bind)
        .serve(router.into_make_service())
        .await?;

    Ok(())
}

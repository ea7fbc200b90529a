use std::net::TcpListener;

use mockup_server::{
    config::AppConfig,
    startup::create_server,
    telemetry::{get_subscriber, init_subscriber},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    // Init logger
    let subscriber = get_subscriber("mockup-server", "info", std::io::stdout);
    init_subscriber(subscriber)?;

    let config = AppConfig::from_env()?;

    // create the server
    let listener = TcpListener::bind(&config.servlet.address)?;
    tracing::info!(address = %config.servlet.address, "Listening");
    let server = create_server(listener, config)?;

    // run the server
    server.await?;

    Ok(())
}

use envconfig::Envconfig;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use shopfeed::app;
use shopfeed::config::Config;

fn setup_tracing() {
    let log_layer = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(log_layer).init();
}

#[tokio::main]
async fn main() {
    setup_tracing();

    let config = Config::init_from_env().expect("Invalid configuration:");
    info!(
        feeds = config.feed_urls.0.len(),
        "starting shopfeed ingestion service"
    );

    if let Err(err) = app::run(config).await {
        error!("shopfeed terminated: {err}");
        std::process::exit(1);
    }
}

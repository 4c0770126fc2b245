use std::env;

use educonnect_session::logging::{LoggingOptions, init_logging};
use educonnect_session::{CatalogClient, SessionConfig};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = SessionConfig::from_env();
    init_logging(&LoggingOptions {
        format: config.log_format,
        directive: None,
    });

    let client = CatalogClient::from_config(config).await?;

    let mut events = client.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            info!(?event, "Session event");
        }
    });

    if let (Ok(email), Ok(password)) = (
        env::var("EDUCONNECT_EMAIL"),
        env::var("EDUCONNECT_PASSWORD"),
    ) {
        client.login(&email, &password).await?;
        info!(%email, "Logged in");
    } else if !client.is_authenticated().await {
        warn!("No stored credential; browsing anonymously");
    }

    // The first argument is a course list query string, e.g. "search=ai&level=master".
    let controller = client.filter_controller();
    if let Some(query) = env::args().nth(1) {
        controller.restore(&query);
    }

    let filters = controller.filters();
    let page = client.courses(&filters).await?;
    info!(
        query = %controller.query_string(),
        count = page.count,
        shown = page.results.len(),
        "Fetched courses"
    );
    println!("{}", serde_json::to_string_pretty(&page)?);

    Ok(())
}

use std::sync::Arc;

use fareway::config::Config;
use fareway::db::PgStore;
use fareway::engine::Engine;
use fareway::error::Error;
use fareway::external::{google_maps::GoogleDirections, RouteOracle, StraightLine};
use fareway::notify::ChannelHub;
use fareway::server::serve;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;

    let store = PgStore::new(&config.database_url, config.database_max_connections).await?;

    let oracle: Arc<dyn RouteOracle> = match config.google_maps {
        Some(google_maps) => Arc::new(GoogleDirections::new(google_maps.api_base, google_maps.key)),
        None => {
            tracing::warn!("no directions provider configured, using straight-line estimates");
            Arc::new(StraightLine)
        }
    };

    // Events only reach in-process subscribers; a push transport plugs in as
    // another `Notifier`.
    let engine = Engine::new(
        Arc::new(store),
        oracle,
        Arc::new(ChannelHub::new()),
        config.dispatch,
    )?;

    serve(engine, config.listen_addr).await
}

use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use panel_dash_backend::api::{self, AppState};
use panel_dash_backend::config::Config;
use panel_dash_backend::db::{self, GameStatus};
use panel_dash_backend::events::GameEvents;
use panel_dash_backend::feed::AtCoderProblemsFeed;
use panel_dash_backend::metrics;
use panel_dash_backend::poller::Poller;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    metrics::register_metrics();

    let config = Config::load();

    let db = db::Database::new(&config.database_url)
        .await
        .expect("Failed to initialize database");
    let db = Arc::new(db);

    let feed = AtCoderProblemsFeed::new(&config.feed_base_url, config.feed_timeout)
        .expect("Failed to build feed client");

    let events = GameEvents::new();
    let poller = Arc::new(Poller::new(
        db.clone(),
        Arc::new(feed),
        events.clone(),
        config.poll_settings(),
    ));

    // Resume polling if the process restarted mid-game
    match db.current_game().await {
        Ok(game) => {
            metrics::set_game_status(game.as_ref().map(|g| g.status));
            if let Some(game) = game.filter(|g| g.status == GameStatus::Running) {
                tracing::info!("Resuming polling for running game {}", game.id);
                poller.start();
            }
        }
        Err(e) => tracing::error!("Failed to read current game: {e}"),
    }

    let state = AppState {
        db,
        poller,
        events,
        completion: config.completion_policy(),
    };

    let mut app = api::router(state);
    if let Some(dir) = &config.static_dir {
        tracing::info!("Serving static files from {}", dir.display());
        app = app.fallback_service(ServeDir::new(dir));
    }
    let app = app.layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {addr}: {e}"));

    tracing::info!("Panel Dash backend listening on {addr}");
    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}

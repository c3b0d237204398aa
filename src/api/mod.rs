// HTTP API routes (game state, setup, lifecycle control, manual refresh).

pub mod ws;

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Json, MatchedPath, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use serde_json::json;

use crate::board::Board;
use crate::db::{Database, Game, GameState, GameStatus};
use crate::error::GameError;
use crate::events::{GameEvent, GameEvents};
use crate::feed::SubmissionFeed;
use crate::metrics;
use crate::poller::Poller;
use crate::scoring::{self, CompletionPolicy};
use crate::setup::SetupRequest;

// ── Shared application state ─────────────────────────────────────────

pub struct AppState<F: SubmissionFeed> {
    pub db: Arc<Database>,
    pub poller: Arc<Poller<F>>,
    pub events: GameEvents,
    pub completion: CompletionPolicy,
}

impl<F: SubmissionFeed> Clone for AppState<F> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            poller: self.poller.clone(),
            events: self.events.clone(),
            completion: self.completion,
        }
    }
}

// ── Response types ────────────────────────────────────────────────────

/// The current game as shown to viewers, with freshly computed scores.
#[derive(Debug, Serialize)]
pub struct GameView {
    #[serde(flatten)]
    pub state: GameState,
    pub scores: BTreeMap<i64, usize>,
    pub leaders: Vec<i64>,
    pub complete: bool,
    pub remaining_seconds: Option<i64>,
    pub polling: bool,
}

impl GameView {
    pub fn build(state: GameState, completion: CompletionPolicy, now: i64, polling: bool) -> Self {
        let size = usize::try_from(state.game.board_size).unwrap_or(0);
        let board = Board::from_cells(size, &state.cells);
        let scores = scoring::compute_scores(&board, &state.teams);
        let leaders = scoring::leaders(&scores);
        let complete = scoring::is_game_complete(&state.cells, completion);
        let remaining_seconds = remaining_seconds(&state.game, now);
        Self {
            state,
            scores,
            leaders,
            complete,
            remaining_seconds,
            polling,
        }
    }
}

/// Seconds left on the clock. `None` when there is no limit or the game has
/// not started; frozen at `ended_at` once the game has ended.
pub fn remaining_seconds(game: &Game, now: i64) -> Option<i64> {
    let deadline = game.deadline()?;
    let reference = game.ended_at.unwrap_or(now);
    Some((deadline - reference).max(0))
}

// ── Error helper ──────────────────────────────────────────────────────

fn json_error(status: StatusCode, msg: &str) -> Response {
    (status, Json(json!({ "success": false, "error": msg }))).into_response()
}

fn game_error(e: GameError) -> Response {
    let status = match &e {
        GameError::Validation(_) => StatusCode::BAD_REQUEST,
        GameError::NoPendingGame | GameError::NoRunningGame | GameError::GameInProgress => {
            StatusCode::CONFLICT
        }
        GameError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if e.is_client_error() {
        json_error(status, &e.to_string())
    } else {
        tracing::error!("Database error: {e}");
        json_error(status, "Internal server error")
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

// ── Router ────────────────────────────────────────────────────────────

pub fn router<F: SubmissionFeed>(state: AppState<F>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(get_metrics))
        // Game
        .route("/api/game", get(get_game::<F>))
        .route("/api/game/setup", post(setup_game::<F>))
        .route("/api/game/start", post(start_game::<F>))
        .route("/api/game/end", post(end_game::<F>))
        .route("/api/game/refresh", post(refresh_game::<F>))
        // WebSocket
        .route("/ws/game", get(ws::ws_game::<F>))
        .route_layer(middleware::from_fn(track_requests))
        .with_state(state)
}

async fn track_requests(req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());
    let response = next.run(req).await;
    metrics::API_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, response.status().as_str()])
        .inc();
    response
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "panel-dash-backend" }))
}

async fn get_metrics() -> impl IntoResponse {
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4",
        )],
        metrics::gather_metrics(),
    )
}

async fn get_game<F: SubmissionFeed>(State(state): State<AppState<F>>) -> Response {
    match state.db.get_game_state().await {
        Ok(Some(game)) => {
            let view = GameView::build(game, state.completion, now(), state.poller.is_active());
            (StatusCode::OK, Json(view)).into_response()
        }
        Ok(None) => (StatusCode::OK, Json(serde_json::Value::Null)).into_response(),
        Err(e) => game_error(e.into()),
    }
}

async fn setup_game<F: SubmissionFeed>(
    State(state): State<AppState<F>>,
    payload: Result<Json<SetupRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(p) => p,
        Err(rejection) => {
            return json_error(StatusCode::BAD_REQUEST, &rejection.body_text());
        }
    };

    let setup = match req.validate() {
        Ok(s) => s,
        Err(e) => return game_error(e),
    };

    match state.db.save_game_setup(&setup).await {
        Ok(game_id) => {
            tracing::info!(
                "Game {game_id} set up: {}x{} board, {} teams",
                setup.board_size,
                setup.board_size,
                setup.teams.len()
            );
            metrics::set_game_status(Some(GameStatus::Setup));
            state.events.publish(&GameEvent::Status {
                status: GameStatus::Setup,
                at: now(),
            });
            (
                StatusCode::OK,
                Json(json!({ "success": true, "game_id": game_id })),
            )
                .into_response()
        }
        Err(e) => game_error(e),
    }
}

async fn start_game<F: SubmissionFeed>(State(state): State<AppState<F>>) -> Response {
    let at = now();
    match state.db.start_game(at).await {
        Ok(game) => {
            tracing::info!("Game {} started", game.id);
            state.poller.start();
            metrics::set_game_status(Some(GameStatus::Running));
            state.events.publish(&GameEvent::Status {
                status: GameStatus::Running,
                at,
            });
            (
                StatusCode::OK,
                Json(json!({ "success": true, "started_at": game.started_at })),
            )
                .into_response()
        }
        Err(e) => game_error(e),
    }
}

async fn end_game<F: SubmissionFeed>(State(state): State<AppState<F>>) -> Response {
    let at = now();
    match state.db.end_game(at).await {
        Ok(game) => {
            tracing::info!("Game {} ended", game.id);
            state.poller.stop();
            metrics::set_game_status(Some(GameStatus::Ended));
            state.events.publish(&GameEvent::Status {
                status: GameStatus::Ended,
                at,
            });
            (
                StatusCode::OK,
                Json(json!({ "success": true, "ended_at": game.ended_at })),
            )
                .into_response()
        }
        Err(e) => game_error(e),
    }
}

async fn refresh_game<F: SubmissionFeed>(State(state): State<AppState<F>>) -> Response {
    match state.poller.refresh().await {
        Ok(captures) => (
            StatusCode::OK,
            Json(json!({ "success": true, "captures": captures })),
        )
            .into_response(),
        Err(e) => game_error(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::{reject_updates, sample_setup, test_db};
    use crate::feed::Submission;
    use crate::poller::PollSettings;
    use std::time::Duration;

    struct EmptyFeed;

    impl SubmissionFeed for EmptyFeed {
        async fn fetch(&self, _since: i64) -> Vec<Submission> {
            Vec::new()
        }
    }

    async fn running_state() -> AppState<EmptyFeed> {
        let db = Arc::new(test_db().await);
        db.save_game_setup(&sample_setup()).await.unwrap();
        db.start_game(now()).await.unwrap();
        let events = GameEvents::new();
        let poller = Arc::new(Poller::new(
            db.clone(),
            Arc::new(EmptyFeed),
            events.clone(),
            PollSettings {
                interval: Duration::from_secs(3600),
                lookback: Duration::from_secs(60),
            },
        ));
        poller.start();
        AppState {
            db,
            poller,
            events,
            completion: CompletionPolicy::AllCells,
        }
    }

    #[tokio::test]
    async fn test_failed_end_keeps_polling() {
        let state = running_state().await;
        reject_updates(&state.db, "games", "NEW.status = 'ended'").await;

        let response = end_game(State(state.clone())).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let game = state.db.current_game().await.unwrap().unwrap();
        assert_eq!(game.status, GameStatus::Running);
        assert!(state.poller.is_active());
        state.poller.stop();
    }

    #[tokio::test]
    async fn test_end_stops_polling() {
        let state = running_state().await;
        let response = end_game(State(state.clone())).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!state.poller.is_active());
    }

    fn game(time_limit: Option<i64>, started_at: Option<i64>, ended_at: Option<i64>) -> Game {
        Game {
            id: 1,
            board_size: 3,
            time_limit,
            status: GameStatus::Running,
            started_at,
            ended_at,
        }
    }

    #[test]
    fn test_remaining_seconds() {
        assert_eq!(remaining_seconds(&game(None, Some(100), None), 200), None);
        assert_eq!(remaining_seconds(&game(Some(0), Some(100), None), 200), None);
        assert_eq!(remaining_seconds(&game(Some(10), None, None), 200), None);
        assert_eq!(remaining_seconds(&game(Some(10), Some(100), None), 160), Some(540));
        assert_eq!(remaining_seconds(&game(Some(1), Some(100), None), 1000), Some(0));
        assert_eq!(
            remaining_seconds(&game(Some(10), Some(100), Some(400)), 10_000),
            Some(300)
        );
    }

    #[test]
    fn test_error_statuses() {
        assert_eq!(
            game_error(GameError::Validation("x".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            game_error(GameError::NoPendingGame).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            game_error(GameError::Database(sqlx::Error::PoolClosed)).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}

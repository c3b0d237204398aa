// Database access layer (SQLite via sqlx).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::error::GameError;
use crate::setup::GameSetup;

/// Lifecycle of a game. Transitions are strictly setup -> running -> ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum GameStatus {
    Setup,
    Running,
    Ended,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Game {
    pub id: i64,
    pub board_size: i64,
    pub time_limit: Option<i64>,
    pub status: GameStatus,
    pub started_at: Option<i64>,
    pub ended_at: Option<i64>,
}

impl Game {
    /// Last second at which submissions still count: `started_at` plus the
    /// time limit. `None` when there is no limit or the game has not started.
    pub fn deadline(&self) -> Option<i64> {
        let limit = self.time_limit.filter(|t| *t > 0)?;
        Some(self.started_at? + limit * 60)
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct TeamRow {
    id: i64,
    name: String,
    color: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: i64,
    pub name: String,
    pub color: String,
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Cell {
    pub id: i64,
    pub row: i64,
    pub col: i64,
    pub problem_url: Option<String>,
    pub problem_id: Option<String>,
    pub captured_by_team_id: Option<i64>,
    pub captured_by_user: Option<String>,
    pub captured_at: Option<i64>,
}

/// An unowned cell that can still be captured.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct UncapturedCell {
    pub id: i64,
    pub row: i64,
    pub col: i64,
    pub problem_id: String,
}

/// The current game with its roster and board.
#[derive(Debug, Clone, Serialize)]
pub struct GameState {
    #[serde(flatten)]
    pub game: Game,
    pub teams: Vec<Team>,
    pub cells: Vec<Cell>,
}

const GAME_COLUMNS: &str = "id, board_size, time_limit, status, started_at, ended_at";
const CELL_COLUMNS: &str =
    "id, row, col, problem_url, problem_id, captured_by_team_id, captured_by_user, captured_at";

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS games (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                board_size INTEGER NOT NULL,
                time_limit INTEGER,
                status TEXT NOT NULL DEFAULT 'setup',
                started_at INTEGER,
                ended_at INTEGER,
                created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS teams (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                game_id INTEGER NOT NULL REFERENCES games(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                color TEXT NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS team_members (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                team_id INTEGER NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
                atcoder_id TEXT NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cells (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                game_id INTEGER NOT NULL REFERENCES games(id) ON DELETE CASCADE,
                row INTEGER NOT NULL,
                col INTEGER NOT NULL,
                problem_url TEXT,
                problem_id TEXT,
                captured_by_team_id INTEGER REFERENCES teams(id),
                captured_by_user TEXT,
                captured_at INTEGER,
                UNIQUE(game_id, row, col)
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ── Games ─────────────────────────────────────────────────────────

    /// The current game: the non-terminal game if there is one, otherwise the
    /// most recently ended game.
    pub async fn current_game(&self) -> Result<Option<Game>, sqlx::Error> {
        let row = sqlx::query_as::<_, Game>(&format!(
            "SELECT {GAME_COLUMNS} FROM games \
             ORDER BY CASE status WHEN 'running' THEN 0 WHEN 'setup' THEN 1 ELSE 2 END, id DESC \
             LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Load the current game together with its teams (and members) and cells.
    pub async fn get_game_state(&self) -> Result<Option<GameState>, sqlx::Error> {
        let Some(game) = self.current_game().await? else {
            return Ok(None);
        };

        let team_rows = sqlx::query_as::<_, TeamRow>(
            "SELECT id, name, color FROM teams WHERE game_id = ? ORDER BY id",
        )
        .bind(game.id)
        .fetch_all(&self.pool)
        .await?;

        let member_rows: Vec<(i64, String)> = sqlx::query_as(
            "SELECT tm.team_id, tm.atcoder_id FROM team_members tm \
             JOIN teams t ON tm.team_id = t.id \
             WHERE t.game_id = ? ORDER BY tm.id",
        )
        .bind(game.id)
        .fetch_all(&self.pool)
        .await?;

        let mut members: HashMap<i64, Vec<String>> = HashMap::new();
        for (team_id, handle) in member_rows {
            members.entry(team_id).or_default().push(handle);
        }

        let teams = team_rows
            .into_iter()
            .map(|t| Team {
                members: members.remove(&t.id).unwrap_or_default(),
                id: t.id,
                name: t.name,
                color: t.color,
            })
            .collect();

        let cells = sqlx::query_as::<_, Cell>(&format!(
            "SELECT {CELL_COLUMNS} FROM cells WHERE game_id = ? ORDER BY row, col"
        ))
        .bind(game.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(GameState { game, teams, cells }))
    }

    /// Store a validated setup as a new setup-phase game, replacing any
    /// earlier setup-phase game. Rejected while a game is running.
    pub async fn save_game_setup(&self, setup: &GameSetup) -> Result<i64, GameError> {
        let mut tx = self.pool.begin().await?;

        let running: Option<i64> =
            sqlx::query_scalar("SELECT id FROM games WHERE status = 'running' LIMIT 1")
                .fetch_optional(&mut *tx)
                .await?;
        if running.is_some() {
            return Err(GameError::GameInProgress);
        }

        sqlx::query(
            "DELETE FROM team_members WHERE team_id IN \
             (SELECT t.id FROM teams t JOIN games g ON t.game_id = g.id WHERE g.status = 'setup')",
        )
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "DELETE FROM cells WHERE game_id IN (SELECT id FROM games WHERE status = 'setup')",
        )
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "DELETE FROM teams WHERE game_id IN (SELECT id FROM games WHERE status = 'setup')",
        )
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM games WHERE status = 'setup'")
            .execute(&mut *tx)
            .await?;

        let game_id: i64 = sqlx::query_scalar(
            "INSERT INTO games (board_size, time_limit, status) VALUES (?, ?, 'setup') RETURNING id",
        )
        .bind(setup.board_size)
        .bind(setup.time_limit)
        .fetch_one(&mut *tx)
        .await?;

        for team in &setup.teams {
            let team_id: i64 = sqlx::query_scalar(
                "INSERT INTO teams (game_id, name, color) VALUES (?, ?, ?) RETURNING id",
            )
            .bind(game_id)
            .bind(&team.name)
            .bind(&team.color)
            .fetch_one(&mut *tx)
            .await?;

            for handle in &team.members {
                sqlx::query("INSERT INTO team_members (team_id, atcoder_id) VALUES (?, ?)")
                    .bind(team_id)
                    .bind(handle)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        for cell in &setup.cells {
            sqlx::query(
                "INSERT INTO cells (game_id, row, col, problem_url, problem_id) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(game_id)
            .bind(cell.row)
            .bind(cell.col)
            .bind(&cell.problem_url)
            .bind(&cell.problem_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(game_id)
    }

    /// Move the pending setup-phase game to running.
    pub async fn start_game(&self, now: i64) -> Result<Game, GameError> {
        let row = sqlx::query_as::<_, Game>(&format!(
            "UPDATE games SET status = 'running', started_at = ? \
             WHERE id = (SELECT id FROM games WHERE status = 'setup' ORDER BY id DESC LIMIT 1) \
             AND status = 'setup' \
             AND NOT EXISTS (SELECT 1 FROM games WHERE status = 'running') \
             RETURNING {GAME_COLUMNS}"
        ))
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or(GameError::NoPendingGame)
    }

    /// Move the running game to ended.
    pub async fn end_game(&self, now: i64) -> Result<Game, GameError> {
        let row = sqlx::query_as::<_, Game>(&format!(
            "UPDATE games SET status = 'ended', ended_at = ? \
             WHERE status = 'running' \
             RETURNING {GAME_COLUMNS}"
        ))
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or(GameError::NoRunningGame)
    }

    // ── Capture state ─────────────────────────────────────────────────

    /// Map of lowercased member handle to team id for one game.
    pub async fn members_by_team(&self, game_id: i64) -> Result<HashMap<String, i64>, sqlx::Error> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT tm.atcoder_id, t.id FROM team_members tm \
             JOIN teams t ON tm.team_id = t.id \
             WHERE t.game_id = ? ORDER BY tm.id",
        )
        .bind(game_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(handle, team_id)| (handle.to_lowercase(), team_id))
            .collect())
    }

    /// Unowned cells of one game that are bound to a problem.
    pub async fn uncaptured_cells_with_problem(
        &self,
        game_id: i64,
    ) -> Result<Vec<UncapturedCell>, sqlx::Error> {
        let rows = sqlx::query_as::<_, UncapturedCell>(
            "SELECT id, row, col, problem_id FROM cells \
             WHERE game_id = ? AND captured_by_team_id IS NULL AND problem_id IS NOT NULL \
             ORDER BY id",
        )
        .bind(game_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Assign an unowned cell to a team. Returns false if the cell already has
    /// an owner (or does not exist). The ownership check and the write are a
    /// single conditional UPDATE, so concurrent callers can never both win.
    pub async fn try_capture_cell(
        &self,
        cell_id: i64,
        team_id: i64,
        user: &str,
        captured_at: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE cells SET captured_by_team_id = ?, captured_by_user = ?, captured_at = ? \
             WHERE id = ? AND captured_by_team_id IS NULL",
        )
        .bind(team_id)
        .bind(user)
        .bind(captured_at)
        .bind(cell_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

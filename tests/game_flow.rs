// Library-level game flow: setup, start, capture resolution and scoring,
// including overlapping resolution passes racing for the same cells.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use panel_dash_backend::board::Board;
use panel_dash_backend::capture;
use panel_dash_backend::db::{Database, GameStatus};
use panel_dash_backend::events::GameEvents;
use panel_dash_backend::feed::{Submission, SubmissionFeed};
use panel_dash_backend::poller::{PollSettings, Poller};
use panel_dash_backend::scoring::{self, CompletionPolicy};
use panel_dash_backend::setup::{CellSetup, SetupRequest, TeamSetup};

struct StubFeed(Mutex<Vec<Submission>>);

impl SubmissionFeed for StubFeed {
    async fn fetch(&self, _since: i64) -> Vec<Submission> {
        self.0.lock().unwrap().clone()
    }
}

fn sub(user: &str, problem: &str, result: &str, at: i64) -> Submission {
    Submission {
        id: None,
        user_id: user.into(),
        problem_id: problem.into(),
        result: result.into(),
        epoch_second: at,
    }
}

fn task(id: &str) -> Option<String> {
    Some(format!("https://atcoder.jp/contests/x/tasks/{id}"))
}

async fn test_db() -> Database {
    Database::new("sqlite::memory:").await.unwrap()
}

#[tokio::test]
async fn test_single_team_scenario() {
    let db = test_db().await;
    let setup = SetupRequest {
        board_size: 2,
        time_limit: None,
        teams: vec![TeamSetup {
            name: "Solo".into(),
            color: "#123456".into(),
            members: vec!["alice".into()],
        }],
        cells: vec![
            CellSetup { row: 0, col: 0, problem_url: task("P1") },
            CellSetup { row: 0, col: 1, problem_url: task("P2") },
            CellSetup { row: 1, col: 0, problem_url: None },
            CellSetup { row: 1, col: 1, problem_url: None },
        ],
    }
    .validate()
    .unwrap();
    db.save_game_setup(&setup).await.unwrap();

    let t0 = 1_700_000_000;
    let game = db.start_game(t0).await.unwrap();
    assert_eq!(game.status, GameStatus::Running);

    let batch = vec![sub("alice", "P1", "AC", t0 + 10)];
    let captures = capture::resolve(&db, Some(&game), &batch, |_| {}).await.unwrap();
    assert_eq!(captures.len(), 1);

    let state = db.get_game_state().await.unwrap().unwrap();
    let team = state.teams[0].id;
    let p1 = state.cells.iter().find(|c| (c.row, c.col) == (0, 0)).unwrap();
    assert_eq!(p1.captured_by_team_id, Some(team));

    let board = Board::from_cells(2, &state.cells);
    let scores = scoring::compute_scores(&board, &state.teams);
    assert_eq!(scores[&team], 1);
    assert!(!scoring::is_game_complete(&state.cells, CompletionPolicy::AllCells));
    assert!(!scoring::is_game_complete(&state.cells, CompletionPolicy::ProblemCellsOnly));
}

#[tokio::test]
async fn test_region_scoring_after_captures() {
    let db = test_db().await;
    let mut cells = Vec::new();
    for row in 0..3 {
        for col in 0..3 {
            cells.push(CellSetup {
                row,
                col,
                problem_url: task(&format!("q{row}{col}")),
            });
        }
    }
    let setup = SetupRequest {
        board_size: 3,
        time_limit: Some(60),
        teams: vec![
            TeamSetup { name: "A".into(), color: "red".into(), members: vec!["a1".into(), "a2".into()] },
            TeamSetup { name: "B".into(), color: "blue".into(), members: vec!["b1".into()] },
        ],
        cells,
    }
    .validate()
    .unwrap();
    db.save_game_setup(&setup).await.unwrap();
    let game = db.start_game(0).await.unwrap();

    // A takes an L shape plus an isolated corner; B takes the middle column below row 0
    let batch = vec![
        sub("a1", "q00", "AC", 1),
        sub("a2", "q01", "AC", 2),
        sub("a1", "q11", "AC", 3),
        sub("a2", "q22", "AC", 4),
        sub("b1", "q21", "AC", 5),
        sub("b1", "q20", "AC", 6),
        sub("b1", "q11", "AC", 0),
    ];
    capture::resolve(&db, Some(&game), &batch, |_| {}).await.unwrap();

    let state = db.get_game_state().await.unwrap().unwrap();
    let (a, b) = (state.teams[0].id, state.teams[1].id);
    let scores = scoring::compute_scores(&Board::from_cells(3, &state.cells), &state.teams);

    // b1 solved q11 first (t=0), so A's L shape is broken: (0,0),(0,1) only
    assert_eq!(scores[&a], 2);
    // B holds (1,1),(2,1),(2,0) connected
    assert_eq!(scores[&b], 3);
    assert_eq!(scoring::leaders(&scores), vec![b]);
}

#[tokio::test]
async fn test_manual_refresh_racing_poll_loop() {
    let db = Arc::new(test_db().await);
    let mut cells = Vec::new();
    for col in 0..4 {
        cells.push(CellSetup { row: 0, col, problem_url: task(&format!("r{col}")) });
    }
    let setup = SetupRequest {
        board_size: 4,
        time_limit: None,
        teams: vec![
            TeamSetup { name: "A".into(), color: "red".into(), members: vec!["a".into()] },
            TeamSetup { name: "B".into(), color: "blue".into(), members: vec!["b".into()] },
        ],
        cells,
    }
    .validate()
    .unwrap();
    db.save_game_setup(&setup).await.unwrap();
    let now = chrono::Utc::now().timestamp();
    db.start_game(now - 100).await.unwrap();

    // B solved everything first, A solved everything later
    let mut batch = Vec::new();
    for col in 0..4 {
        batch.push(sub("a", &format!("r{col}"), "AC", now - 10 + col));
        batch.push(sub("b", &format!("r{col}"), "AC", now - 50 + col));
    }
    let feed = Arc::new(StubFeed(Mutex::new(batch)));
    let poller = Arc::new(Poller::new(
        db.clone(),
        feed,
        GameEvents::new(),
        PollSettings {
            interval: Duration::from_millis(5),
            lookback: Duration::from_secs(60),
        },
    ));

    poller.start();
    let mut handles = Vec::new();
    for _ in 0..4 {
        let poller = poller.clone();
        handles.push(tokio::spawn(async move { poller.refresh().await.unwrap() }));
    }
    let mut refreshed = 0;
    for h in handles {
        refreshed += h.await.unwrap().len();
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    poller.stop();

    assert!(refreshed <= 4);
    let state = db.get_game_state().await.unwrap().unwrap();
    let b = state.teams[1].id;
    for cell in &state.cells {
        assert_eq!(cell.captured_by_team_id, Some(b));
        assert_eq!(cell.captured_by_user.as_deref(), Some("b"));
    }
}

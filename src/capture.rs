// Capture resolution: turns a batch of judge submissions into cell captures.
//
// Within one pass candidates are applied in submission-time order, so the
// earliest accepted submission for a problem wins its cell no matter how the
// feed ordered the batch. Across passes, the store's conditional update keeps
// every capture first-writer-wins.

use std::collections::HashMap;

use serde::Serialize;

use crate::db::{Database, Game, GameStatus, UncapturedCell};
use crate::feed::Submission;
use crate::metrics;

/// The judge verdict that counts as solved.
pub const ACCEPTED: &str = "AC";

/// A submission that passed every filter in one resolution pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub cell_id: i64,
    pub row: i64,
    pub col: i64,
    pub problem_id: String,
    pub team_id: i64,
    /// Lowercased judge handle.
    pub user: String,
    pub epoch_second: i64,
}

/// A capture that was committed to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capture {
    pub cell_id: i64,
    pub row: i64,
    pub col: i64,
    pub problem_id: String,
    pub team_id: i64,
    pub user: String,
    pub captured_at: i64,
}

/// Filter a raw batch down to capture candidates and order them by
/// submission time. Only submissions in `[started_at, deadline]` count.
/// Ties keep judge submission id order, then feed order.
pub fn select_candidates(
    submissions: &[Submission],
    members: &HashMap<String, i64>,
    open_cells: &HashMap<String, UncapturedCell>,
    started_at: i64,
    deadline: Option<i64>,
) -> Vec<Candidate> {
    let mut accepted: Vec<(&Submission, Candidate)> = submissions
        .iter()
        .filter(|s| s.result == ACCEPTED && s.epoch_second >= started_at)
        .filter(|s| deadline.map_or(true, |d| s.epoch_second <= d))
        .filter_map(|s| {
            let user = s.user_id.trim().to_lowercase();
            let team_id = *members.get(&user)?;
            let cell = open_cells.get(&s.problem_id)?;
            Some((
                s,
                Candidate {
                    cell_id: cell.id,
                    row: cell.row,
                    col: cell.col,
                    problem_id: s.problem_id.clone(),
                    team_id,
                    user,
                    epoch_second: s.epoch_second,
                },
            ))
        })
        .collect();

    accepted.sort_by_key(|(s, _)| (s.epoch_second, s.id.unwrap_or(i64::MAX)));
    accepted.into_iter().map(|(_, c)| c).collect()
}

/// Run one resolution pass for `game` over `submissions` and return the
/// captures that were committed. `on_capture` sees each capture right after
/// its commit, so captures made before a storage error are still reported.
///
/// A pass for an absent or non-running game, a game without members, or a
/// board without capturable cells does nothing.
pub async fn resolve(
    db: &Database,
    game: Option<&Game>,
    submissions: &[Submission],
    mut on_capture: impl FnMut(&Capture),
) -> Result<Vec<Capture>, sqlx::Error> {
    let Some(game) = game else {
        return Ok(Vec::new());
    };
    if game.status != GameStatus::Running || submissions.is_empty() {
        return Ok(Vec::new());
    }

    let members = db.members_by_team(game.id).await?;
    if members.is_empty() {
        return Ok(Vec::new());
    }

    let uncaptured = db.uncaptured_cells_with_problem(game.id).await?;
    if uncaptured.is_empty() {
        return Ok(Vec::new());
    }

    let mut open_cells: HashMap<String, UncapturedCell> = uncaptured
        .into_iter()
        .map(|c| (c.problem_id.clone(), c))
        .collect();

    let started_at = game.started_at.unwrap_or(0);
    let candidates =
        select_candidates(submissions, &members, &open_cells, started_at, game.deadline());

    let mut captures = Vec::new();
    for candidate in candidates {
        // An earlier candidate in this batch may already have taken the cell
        if open_cells.remove(&candidate.problem_id).is_none() {
            continue;
        }

        let won = match db
            .try_capture_cell(
                candidate.cell_id,
                candidate.team_id,
                &candidate.user,
                candidate.epoch_second,
            )
            .await
        {
            Ok(won) => won,
            Err(e) => {
                tracing::error!(
                    "Capture of {} failed after {} committed captures: {e}",
                    candidate.problem_id,
                    captures.len()
                );
                return Err(e);
            }
        };

        if !won {
            tracing::debug!(
                "Cell {} already captured, dropping {} by {}",
                candidate.cell_id,
                candidate.problem_id,
                candidate.user
            );
            continue;
        }

        tracing::info!(
            "Cell captured: {} by {} (team {})",
            candidate.problem_id,
            candidate.user,
            candidate.team_id
        );
        metrics::CAPTURES_TOTAL
            .with_label_values(&[&candidate.team_id.to_string()])
            .inc();

        let capture = Capture {
            cell_id: candidate.cell_id,
            row: candidate.row,
            col: candidate.col,
            problem_id: candidate.problem_id,
            team_id: candidate.team_id,
            user: candidate.user,
            captured_at: candidate.epoch_second,
        };
        on_capture(&capture);
        captures.push(capture);
    }

    Ok(captures)
}

// Scoring: largest 4-connected region per team, plus the completion check.
//
// Scores are never persisted. They are recomputed from the board on every read.

use std::collections::{BTreeMap, VecDeque};

use crate::board::Board;
use crate::db::{Cell, Team};

const DIRECTIONS: [(isize, isize); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

/// Which cells must be owned before a game counts as complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionPolicy {
    /// Every cell on the board, including cells without a problem.
    AllCells,
    /// Only cells bound to a problem. Problem-less cells can never be
    /// captured, so under `AllCells` a board containing one never completes.
    ProblemCellsOnly,
}

impl CompletionPolicy {
    pub fn from_flag(count_empty_cells: bool) -> Self {
        if count_empty_cells {
            Self::AllCells
        } else {
            Self::ProblemCellsOnly
        }
    }
}

/// Score every team on the roster. Teams owning nothing score 0.
pub fn compute_scores(board: &Board, teams: &[Team]) -> BTreeMap<i64, usize> {
    teams
        .iter()
        .map(|team| (team.id, largest_component(board, team.id)))
        .collect()
}

/// Size of the largest 4-connected group of cells owned by `team_id`.
pub fn largest_component(board: &Board, team_id: i64) -> usize {
    let size = board.size();
    let mut visited = vec![false; size * size];
    let mut queue = VecDeque::new();
    let mut max_size = 0;

    for start_row in 0..size {
        for start_col in 0..size {
            if visited[start_row * size + start_col]
                || board.owner(start_row, start_col) != Some(team_id)
            {
                continue;
            }

            visited[start_row * size + start_col] = true;
            queue.push_back((start_row, start_col));
            let mut component = 0;

            while let Some((row, col)) = queue.pop_front() {
                component += 1;
                for (dr, dc) in DIRECTIONS {
                    let (Some(nr), Some(nc)) =
                        (row.checked_add_signed(dr), col.checked_add_signed(dc))
                    else {
                        continue;
                    };
                    if nr >= size || nc >= size || visited[nr * size + nc] {
                        continue;
                    }
                    if board.owner(nr, nc) == Some(team_id) {
                        visited[nr * size + nc] = true;
                        queue.push_back((nr, nc));
                    }
                }
            }

            max_size = max_size.max(component);
        }
    }

    max_size
}

/// Whether every cell counted by `policy` has an owner. Advisory only; the
/// game status is never changed because of it.
pub fn is_game_complete(cells: &[Cell], policy: CompletionPolicy) -> bool {
    cells
        .iter()
        .filter(|cell| match policy {
            CompletionPolicy::AllCells => true,
            CompletionPolicy::ProblemCellsOnly => cell.problem_id.is_some(),
        })
        .all(|cell| cell.captured_by_team_id.is_some())
}

/// Team ids sharing the highest score. Empty when there are no teams.
pub fn leaders(scores: &BTreeMap<i64, usize>) -> Vec<i64> {
    let Some(best) = scores.values().copied().max() else {
        return Vec::new();
    };
    scores
        .iter()
        .filter(|(_, score)| **score == best)
        .map(|(team_id, _)| *team_id)
        .collect()
}

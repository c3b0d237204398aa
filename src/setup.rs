// Setup input: request shape, validation and problem id extraction.
//
// Setup is all-or-nothing: any invalid field rejects the whole request.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;

use crate::error::GameError;

/// Largest accepted board side length.
pub const MAX_BOARD_SIZE: i64 = 32;

#[derive(Debug, Clone, Deserialize)]
pub struct SetupRequest {
    pub board_size: i64,
    /// Minutes; `0` or absent means no limit.
    pub time_limit: Option<i64>,
    pub teams: Vec<TeamSetup>,
    pub cells: Vec<CellSetup>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeamSetup {
    pub name: String,
    pub color: String,
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CellSetup {
    pub row: i64,
    pub col: i64,
    pub problem_url: Option<String>,
}

/// A setup request that passed validation, normalized for storage.
#[derive(Debug, Clone, PartialEq)]
pub struct GameSetup {
    pub board_size: i64,
    pub time_limit: Option<i64>,
    pub teams: Vec<NewTeam>,
    pub cells: Vec<NewCell>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTeam {
    pub name: String,
    pub color: String,
    /// Trimmed, lowercased, deduplicated handles.
    pub members: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCell {
    pub row: i64,
    pub col: i64,
    pub problem_url: Option<String>,
    pub problem_id: Option<String>,
}

/// Extract the problem id from a task URL: the path segment after the last
/// `/tasks/`, cut at the first `?` or `#`.
///
/// `https://atcoder.jp/contests/abc001/tasks/abc001_a` yields `abc001_a`.
pub fn extract_problem_id(url: &str) -> Option<String> {
    let (_, tail) = url.rsplit_once("/tasks/")?;
    let id = tail.split(['?', '#']).next().unwrap_or_default().trim();
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

impl SetupRequest {
    /// Validate and normalize the request.
    pub fn validate(self) -> Result<GameSetup, GameError> {
        if self.board_size < 1 || self.board_size > MAX_BOARD_SIZE {
            return Err(invalid(format!(
                "board_size must be between 1 and {MAX_BOARD_SIZE}"
            )));
        }

        let time_limit = match self.time_limit {
            Some(t) if t < 0 => return Err(invalid("time_limit must not be negative")),
            Some(0) | None => None,
            Some(t) => Some(t),
        };

        if self.teams.is_empty() {
            return Err(invalid("at least one team is required"));
        }

        let mut owner_of: HashMap<String, usize> = HashMap::new();
        let mut teams = Vec::with_capacity(self.teams.len());
        for (index, team) in self.teams.into_iter().enumerate() {
            let name = team.name.trim().to_string();
            if name.is_empty() {
                return Err(invalid(format!("team {} has no name", index + 1)));
            }
            let color = team.color.trim().to_string();
            if color.is_empty() {
                return Err(invalid(format!("team '{name}' has no color")));
            }

            let mut members = Vec::new();
            for handle in team.members {
                let handle = handle.trim().to_lowercase();
                if handle.is_empty() {
                    continue;
                }
                match owner_of.get(&handle) {
                    Some(&other) if other == index => continue,
                    Some(_) => {
                        return Err(invalid(format!(
                            "member '{handle}' belongs to more than one team"
                        )))
                    }
                    None => {
                        owner_of.insert(handle.clone(), index);
                        members.push(handle);
                    }
                }
            }

            teams.push(NewTeam {
                name,
                color,
                members,
            });
        }

        let mut coordinates = HashSet::new();
        let mut problems = HashSet::new();
        let mut cells = Vec::with_capacity(self.cells.len());
        for cell in self.cells {
            if !(0..self.board_size).contains(&cell.row) || !(0..self.board_size).contains(&cell.col)
            {
                return Err(invalid(format!(
                    "cell ({}, {}) is outside the board",
                    cell.row, cell.col
                )));
            }
            if !coordinates.insert((cell.row, cell.col)) {
                return Err(invalid(format!(
                    "cell ({}, {}) is listed twice",
                    cell.row, cell.col
                )));
            }

            let problem_url = cell
                .problem_url
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty());
            let problem_id = problem_url.as_deref().and_then(extract_problem_id);
            if let Some(id) = &problem_id {
                if !problems.insert(id.clone()) {
                    return Err(invalid(format!("problem '{id}' is bound to more than one cell")));
                }
            }

            cells.push(NewCell {
                row: cell.row,
                col: cell.col,
                problem_url,
                problem_id,
            });
        }

        Ok(GameSetup {
            board_size: self.board_size,
            time_limit,
            teams,
            cells,
        })
    }
}

fn invalid(msg: impl Into<String>) -> GameError {
    GameError::Validation(msg.into())
}

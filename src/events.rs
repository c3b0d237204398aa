// Fan-out of game events to WebSocket spectators.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::capture::Capture;
use crate::db::GameStatus;

/// Messages pushed to spectators when the board or the game status changes.
#[derive(Clone, Serialize, Debug, PartialEq)]
#[serde(tag = "type")]
pub enum GameEvent {
    #[serde(rename = "captured")]
    Captured {
        cell_id: i64,
        row: i64,
        col: i64,
        problem_id: String,
        team_id: i64,
        user: String,
        at: i64,
    },
    #[serde(rename = "status")]
    Status { status: GameStatus, at: i64 },
}

impl From<&Capture> for GameEvent {
    fn from(c: &Capture) -> Self {
        GameEvent::Captured {
            cell_id: c.cell_id,
            row: c.row,
            col: c.col,
            problem_id: c.problem_id.clone(),
            team_id: c.team_id,
            user: c.user.clone(),
            at: c.captured_at,
        }
    }
}

/// Broadcast channel carrying serialized [`GameEvent`]s.
#[derive(Debug, Clone)]
pub struct GameEvents {
    tx: broadcast::Sender<String>,
}

impl GameEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    /// Subscribe to events. Returns a receiver that yields JSON strings.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    /// Send an event to every subscriber. Having no subscribers is fine.
    pub fn publish(&self, event: &GameEvent) {
        match serde_json::to_string(event) {
            Ok(json) => {
                let _ = self.tx.send(json);
            }
            Err(e) => tracing::error!("Failed to serialize game event: {e}"),
        }
    }
}

impl Default for GameEvents {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_event_serialization() {
        let event = GameEvent::Captured {
            cell_id: 3,
            row: 1,
            col: 2,
            problem_id: "abc001_a".into(),
            team_id: 1,
            user: "alice".into(),
            at: 1234,
        };
        let value: Value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "captured",
                "cell_id": 3,
                "row": 1,
                "col": 2,
                "problem_id": "abc001_a",
                "team_id": 1,
                "user": "alice",
                "at": 1234
            })
        );

        let status = GameEvent::Status {
            status: GameStatus::Running,
            at: 99,
        };
        let value: Value = serde_json::to_value(&status).unwrap();
        assert_eq!(value, json!({"type": "status", "status": "running", "at": 99}));
    }

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let events = GameEvents::new();
        // No subscribers: publishing must not fail
        events.publish(&GameEvent::Status {
            status: GameStatus::Setup,
            at: 0,
        });

        let mut rx = events.subscribe();
        let capture = Capture {
            cell_id: 1,
            row: 0,
            col: 1,
            problem_id: "p1".into(),
            team_id: 2,
            user: "bob".into(),
            captured_at: 50,
        };
        events.publish(&GameEvent::from(&capture));

        let msg = rx.recv().await.unwrap();
        let value: Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(value["type"], "captured");
        assert_eq!(value["team_id"], 2);
        assert_eq!(value["at"], 50);
        assert_eq!(value["col"], 1);
    }
}

// Background poller: pulls recent submissions from the judge feed and runs
// capture resolution while a game is running.
//
// The poller is an explicit controller object. `start` spawns the loop with
// a fresh active flag, `stop` clears that flag. A pass that is already in
// flight when `stop` is called runs to completion; only later ticks are
// skipped. A pass that finds the time limit reached ends the game and the
// loop stops itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::capture::{self, Capture};
use crate::db::{Database, GameStatus};
use crate::error::GameError;
use crate::events::{GameEvent, GameEvents};
use crate::feed::SubmissionFeed;
use crate::metrics;

/// Timing parameters of the poll loop.
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    /// Delay between two passes.
    pub interval: Duration,
    /// How far back each pass queries the feed.
    pub lookback: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            lookback: Duration::from_secs(60),
        }
    }
}

/// One running loop: its active flag and task handle.
struct Run {
    active: Arc<AtomicBool>,
    _handle: JoinHandle<()>,
}

pub struct Poller<F: SubmissionFeed> {
    db: Arc<Database>,
    feed: Arc<F>,
    events: GameEvents,
    settings: PollSettings,
    run: Mutex<Option<Run>>,
}

impl<F: SubmissionFeed> Poller<F> {
    pub fn new(db: Arc<Database>, feed: Arc<F>, events: GameEvents, settings: PollSettings) -> Self {
        Self {
            db,
            feed,
            events,
            settings,
            run: Mutex::new(None),
        }
    }

    /// Whether the poll loop is active.
    pub fn is_active(&self) -> bool {
        self.run
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|run| run.active.load(Ordering::SeqCst))
    }

    /// Start the poll loop. Returns false if it was already active.
    pub fn start(&self) -> bool {
        let mut run = self.run.lock().unwrap();
        if run
            .as_ref()
            .is_some_and(|r| r.active.load(Ordering::SeqCst))
        {
            return false;
        }

        let active = Arc::new(AtomicBool::new(true));
        let handle = tokio::spawn(poll_loop(
            self.db.clone(),
            self.feed.clone(),
            self.events.clone(),
            self.settings,
            active.clone(),
        ));
        *run = Some(Run {
            active,
            _handle: handle,
        });
        metrics::POLLER_ACTIVE.set(1);
        tracing::info!(
            "Poller started (interval {:?}, lookback {:?})",
            self.settings.interval,
            self.settings.lookback
        );
        true
    }

    /// Stop the poll loop. Returns false if it was not active.
    pub fn stop(&self) -> bool {
        let Some(run) = self.run.lock().unwrap().take() else {
            return false;
        };
        let was_active = run.active.swap(false, Ordering::SeqCst);
        metrics::POLLER_ACTIVE.set(0);
        if was_active {
            tracing::info!("Poller stopped");
        }
        was_active
    }

    /// Run a single pass immediately, independent of the loop state.
    pub async fn refresh(&self) -> Result<Vec<Capture>, sqlx::Error> {
        let pass =
            check_submissions(&self.db, self.feed.as_ref(), &self.events, self.settings.lookback)
                .await?;
        if pass.expired {
            self.stop();
        }
        Ok(pass.captures)
    }
}

impl<F: SubmissionFeed> Drop for Poller<F> {
    fn drop(&mut self) {
        if let Ok(mut run) = self.run.lock() {
            if let Some(run) = run.take() {
                run.active.store(false, Ordering::SeqCst);
            }
        }
    }
}

async fn poll_loop<F: SubmissionFeed>(
    db: Arc<Database>,
    feed: Arc<F>,
    events: GameEvents,
    settings: PollSettings,
    active: Arc<AtomicBool>,
) {
    while active.load(Ordering::SeqCst) {
        metrics::POLLS_TOTAL.inc();
        match check_submissions(&db, feed.as_ref(), &events, settings.lookback).await {
            Ok(pass) if pass.expired => {
                if active.swap(false, Ordering::SeqCst) {
                    metrics::POLLER_ACTIVE.set(0);
                    tracing::info!("Poller stopped: time limit reached");
                }
                break;
            }
            Ok(pass) if !pass.captures.is_empty() => {
                tracing::debug!("Poll applied {} captures", pass.captures.len());
            }
            Ok(_) => {}
            Err(e) => {
                metrics::POLL_ERRORS_TOTAL.inc();
                tracing::error!("Polling error: {e}");
            }
        }
        tokio::time::sleep(settings.interval).await;
    }
}

/// Outcome of one resolution pass.
#[derive(Debug, Default)]
pub struct Pass {
    /// Captures committed by this pass.
    pub captures: Vec<Capture>,
    /// The pass found the time limit reached and ended the game.
    pub expired: bool,
}

/// One resolution pass: read the current game, fetch the lookback window
/// from the feed, resolve, and publish each capture as it is committed.
/// Once the time limit is reached the pass ends the game after resolving,
/// so in-time submissions that reach the feed late are still credited.
pub async fn check_submissions<F: SubmissionFeed>(
    db: &Database,
    feed: &F,
    events: &GameEvents,
    lookback: Duration,
) -> Result<Pass, sqlx::Error> {
    let Some(game) = db.current_game().await? else {
        return Ok(Pass::default());
    };
    if game.status != GameStatus::Running {
        return Ok(Pass::default());
    }

    let now = chrono::Utc::now().timestamp();
    let since = now - lookback.as_secs() as i64;
    let submissions = feed.fetch(since).await;

    let captures = capture::resolve(db, Some(&game), &submissions, |c| {
        events.publish(&GameEvent::from(c))
    })
    .await?;

    let expired = game.deadline().is_some_and(|deadline| now >= deadline);
    if expired {
        expire_game(db, events, now).await?;
    }
    Ok(Pass { captures, expired })
}

async fn expire_game(db: &Database, events: &GameEvents, now: i64) -> Result<(), sqlx::Error> {
    match db.end_game(now).await {
        Ok(game) => {
            tracing::info!("Game {} reached its time limit", game.id);
            metrics::set_game_status(Some(GameStatus::Ended));
            events.publish(&GameEvent::Status {
                status: GameStatus::Ended,
                at: now,
            });
            Ok(())
        }
        Err(GameError::Database(e)) => Err(e),
        // Ended concurrently by the operator
        Err(_) => Ok(()),
    }
}

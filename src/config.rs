// Application configuration, loaded from environment variables and CLI flags.

use std::path::PathBuf;
use std::time::Duration;

use crate::poller::PollSettings;
use crate::scoring::CompletionPolicy;

pub const DEFAULT_FEED_BASE_URL: &str = "https://kenkoooo.com/atcoder/atcoder-api/v3";

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database URL (SQLite connection string).
    pub database_url: String,
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Root of the submission feed API.
    pub feed_base_url: String,
    /// Per-request timeout for the feed.
    pub feed_timeout: Duration,
    /// Delay between poll passes.
    pub poll_interval: Duration,
    /// Trailing window queried on each poll.
    pub lookback: Duration,
    /// Whether cells without a problem must be owned for the game to count
    /// as complete.
    pub completion_counts_empty_cells: bool,
    /// Directory containing pre-built frontend files to serve.
    pub static_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables and CLI arguments.
    ///
    /// Environment variables:
    /// - `DATABASE_URL` - SQLite connection string (default: `sqlite:panel_dash.db?mode=rwc`)
    /// - `PORT` - HTTP server port (default: 5000)
    /// - `FEED_BASE_URL` - submission feed root (default: AtCoder Problems v3)
    /// - `FEED_TIMEOUT_SECS` - feed request timeout (default: 10)
    /// - `POLL_INTERVAL_SECS` - seconds between polls (default: 5)
    /// - `LOOKBACK_SECS` - seconds of history fetched per poll (default: 60)
    /// - `COMPLETION_COUNTS_EMPTY_CELLS` - `false` to ignore problem-less cells
    ///   when checking completion (default: true)
    /// - `STATIC_DIR` - Path to frontend directory for static file serving
    ///
    /// CLI flags:
    /// - `--port <PORT>` - Override the port
    pub fn load() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self::from_sources(&args, |key| std::env::var(key).ok())
    }

    /// Build the configuration from CLI args and an environment lookup.
    pub fn from_sources(args: &[String], env: impl Fn(&str) -> Option<String>) -> Self {
        let database_url =
            env("DATABASE_URL").unwrap_or_else(|| "sqlite:panel_dash.db?mode=rwc".to_string());

        // Port: CLI flag --port takes precedence, then env var, then default
        let port = Self::parse_cli_value(args, "--port")
            .and_then(|v| v.parse().ok())
            .or_else(|| env("PORT").and_then(|v| v.parse().ok()))
            .unwrap_or(5000);

        let feed_base_url =
            env("FEED_BASE_URL").unwrap_or_else(|| DEFAULT_FEED_BASE_URL.to_string());

        let secs = |key: &str, default: u64| {
            Duration::from_secs(env(key).and_then(|v| v.parse().ok()).unwrap_or(default))
        };

        let completion_counts_empty_cells = env("COMPLETION_COUNTS_EMPTY_CELLS")
            .map(|v| !(v.eq_ignore_ascii_case("false") || v == "0"))
            .unwrap_or(true);

        let static_dir = env("STATIC_DIR").map(PathBuf::from);

        Config {
            database_url,
            port,
            feed_base_url,
            feed_timeout: secs("FEED_TIMEOUT_SECS", 10),
            poll_interval: secs("POLL_INTERVAL_SECS", 5),
            lookback: secs("LOOKBACK_SECS", 60),
            completion_counts_empty_cells,
            static_dir,
        }
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: self.poll_interval,
            lookback: self.lookback,
        }
    }

    pub fn completion_policy(&self) -> CompletionPolicy {
        CompletionPolicy::from_flag(self.completion_counts_empty_cells)
    }

    /// Parse a CLI flag value like `--port 8080`.
    fn parse_cli_value(args: &[String], flag: &str) -> Option<String> {
        args.windows(2).find_map(|pair| {
            if pair[0] == flag {
                Some(pair[1].clone())
            } else {
                None
            }
        })
    }
}

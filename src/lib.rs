pub mod api;
pub mod board;
pub mod capture;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod feed;
pub mod metrics;
pub mod poller;
pub mod scoring;
pub mod setup;

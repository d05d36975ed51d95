//! Market Wire - a real-time news wire
//!
//! This crate polls a fixed registry of RSS/Atom feeds, merges their entries
//! into one deduplicated, newest-first list and publishes it to a display.

pub mod aggregator;
pub mod config;
pub mod display;
pub mod fetcher;
pub mod refresh;
pub mod routes;

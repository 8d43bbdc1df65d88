//! Core of the fact-check news alert bot.
//!
//! This crate is framework-agnostic. Telegram delivery and the news feed live
//! behind ports (traits) implemented in adapter crates.

pub mod commands;
pub mod config;
pub mod dedup;
pub mod dispatch;
pub mod domain;
pub mod errors;
pub mod feed;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod registry;
pub mod service;

pub use errors::{Error, Result};

//! Core components, types, and utilities for the lore-bot.
//!
//! This module contains fundamental building blocks used throughout the application:
//! - Configuration handling and environment variables.
//! - Fixed reply text and lore formatting.
//! - Common types, events, and the error taxonomy.

pub mod config;
pub mod replies;
pub mod types;

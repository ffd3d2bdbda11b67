//! Movie Code Bot Library
//!
//! A Telegram bot that hands out catalog movies by numeric code.
//!
//! This crate provides the core functionality for:
//! - Storing the movie catalog, users, admins, gate channels, settings and ads
//! - Gating content behind membership in required channels
//! - Routing user commands and multi-step admin conversations
//! - Broadcasting messages and dispatching scheduled ads

pub mod access;
pub mod broadcast;
pub mod commands;
pub mod config;
pub mod conversation;
pub mod storage;
pub mod telegram;

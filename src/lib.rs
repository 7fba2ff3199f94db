//! PNBot: onboarding interviews for a Discord community.

pub mod chat;
pub mod commands;
pub mod config;
pub mod error;
pub mod interview;
pub mod router;
pub mod store;
pub mod ui;

//! Mob - builds third-party dependencies by supervising external commands.

pub mod config;
pub mod context;
pub mod env;
pub mod process;

//! Telegram calorie estimator bot with a food log HTTP API.

pub mod api;
pub mod channels;
pub mod cli;
pub mod config;
pub mod conversation;
pub mod estimator;
pub mod gateway;
pub mod logs;
pub mod session;

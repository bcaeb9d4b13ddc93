pub mod config;
#[macro_use]
pub mod exception;
pub mod json;
pub mod kafka;
pub mod log;
pub mod schedule;
pub mod shutdown;
pub mod task;
pub mod web;

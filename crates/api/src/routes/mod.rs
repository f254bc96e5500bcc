//! Route handlers

pub mod commands;
pub mod health;
pub mod mode;
pub mod vehicle;

pub mod audit;
pub mod classify;
pub mod config;

//! Infrastructure layer: concrete adapters for the domain ports, plus
//! process-wide config and logging setup. Nothing in `services` depends on
//! these modules directly except through `domain::ports` trait objects.

pub mod config;
pub mod database;
pub mod llm;
pub mod logging;
pub mod mirror;
pub mod web;

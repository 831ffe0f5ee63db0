pub mod cli;
pub mod config;
pub mod error;
pub mod frequency;
pub mod git;
pub mod loc;
pub mod model;
pub mod orchestrator;
pub mod output;
pub mod queue;
pub mod service;
pub mod status;
pub mod store;
pub mod util;
pub mod workspace;

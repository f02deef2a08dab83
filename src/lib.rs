pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod queue;
pub mod results;
pub mod sandbox;
pub mod worker;

pub use error::{Result, RunletError};

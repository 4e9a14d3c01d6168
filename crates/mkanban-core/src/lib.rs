pub mod action;
pub mod board;
pub mod condition;
pub mod config;
pub mod context;
pub mod error;
pub mod evaluator;
pub mod event;
pub mod executor;
pub mod io;
pub mod missed;
pub mod paths;
pub mod store;
pub mod trigger;
pub mod types;

pub use error::{MkanbanError, Result};

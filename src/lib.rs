pub mod board;
pub mod cli;
pub mod cli_handlers;
pub mod config;
pub mod error;
pub mod feed;
pub mod gateway;
pub mod logging;
pub mod models;
pub mod ordering;
pub mod permissions;
pub mod priority;
pub mod reconciler;
pub mod selection;

pub use board::{BoardSnapshot, BoardSummary};
pub use error::{BoardError, Result};
pub use reconciler::Reconciler;

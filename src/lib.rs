pub mod cli;
pub mod config;
pub mod error;
pub mod feed;
pub mod report;
pub mod sync;
pub mod telegram;

pub use config::Config;
pub use error::{Error, Result};

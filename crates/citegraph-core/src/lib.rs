pub mod config;
pub mod error;
pub mod types;

pub use config::CitegraphConfig;
pub use error::{CitegraphError, Result};
pub use types::*;

pub mod config;
pub mod error;
pub mod types;

pub use error::{Result, WaypostError};
pub use types::{Identity, LocationSample, SubscriberId};

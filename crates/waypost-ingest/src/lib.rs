pub mod error;
pub mod service;
pub mod validate;

pub use error::IngestError;
pub use service::IngestService;

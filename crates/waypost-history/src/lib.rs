pub mod store;

pub use store::HistoryStore;

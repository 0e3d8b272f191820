pub mod health;
pub mod history;
pub mod report;

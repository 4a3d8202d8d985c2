pub mod history;
pub mod pending;
pub mod query;
pub mod system;

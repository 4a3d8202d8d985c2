pub mod catalog;
pub mod executor;
pub mod manager;

pub use catalog::{Catalog, ColumnInfo, DatabaseInfo, PgCatalog};
pub use executor::{ExecutionError, Executor, PgExecutor};
pub use manager::{DatabaseError, DatabaseManager};

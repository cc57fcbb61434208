//! MySQL access for distinct-value lookups

pub mod connection;
pub mod value_source;

pub use connection::{init_pool, DbPool};
pub use value_source::SqlValueSource;

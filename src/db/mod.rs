//! Database layer - the store connection and schema handling

pub mod schema;
pub mod store;

pub use schema::SchemaInferrer;
pub use store::Store;

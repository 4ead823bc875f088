//! REST CRUD service over a transactional graph-query endpoint.
//!
//! Requests on `/db` are translated into a single parameterized statement,
//! sent to the store's transactional HTTP endpoint, and the columnar answer is
//! reshaped back into plain JSON entities.

pub mod config;
pub mod error;
pub mod model;
pub mod params;
pub mod reshape;
pub mod server;
pub mod service;
pub mod statement;
pub mod store;

pub use error::{Result, ServiceError};
pub use model::Entity;
pub use params::{Caller, QueryParams};
pub use service::DbService;
pub use statement::{Operation, Statement};
pub use store::{GraphStore, HttpStore, StoreError};

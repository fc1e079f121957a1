//! CrudService: the resource CRUD engine, generic over any resolved entity and storage backend.

mod crud;
mod validation;
pub use crud::{CrudService, ListParams, Page, DEFAULT_LIMIT, MAX_LIMIT, MAX_SKIP};
pub use validation::{RequestValidator, WriteMode};

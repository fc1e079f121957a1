//! Demeter: farm-management REST backend built on a schema-driven resource CRUD engine.

pub mod config;
pub mod error;
pub mod handlers;
pub mod migration;
pub mod record;
pub mod response;
pub mod routes;
pub mod service;
pub mod settings;
pub mod sql;
pub mod state;
pub mod store;

pub use config::{builtin_config, load_from_path, resolve, FullConfig, ResolvedEntity, ResolvedModel};
pub use error::{AppError, ConfigError};
pub use migration::apply_migrations;
pub use record::{Record, RecordKey};
pub use response::{success_many, success_one};
pub use routes::{app, common_routes, entity_routes};
pub use service::{CrudService, ListParams};
pub use settings::{Settings, StorageKind};
pub use state::AppState;
pub use store::{ensure_database_exists, MemoryStore, PgStore, Store};

pub mod config;
pub mod error;
pub mod repo;
pub mod schema;
pub mod store;

pub use config::{Config, NetworkSettings, open_data_dir, resolve_data_dir};
pub use error::{Result, StoreError};
pub use repo::Repo;
pub use store::{DeletedUser, Store};

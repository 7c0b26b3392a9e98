pub(crate) mod app;
pub(crate) mod db_dump;

pub use app::{AppMetadata, backup_app};
pub use db_dump::backup_database;

pub(crate) mod app;
pub(crate) mod db_restore;

pub use app::restore_app;
pub use db_restore::restore_database;

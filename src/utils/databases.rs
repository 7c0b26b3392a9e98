use std::fmt;
use std::str::FromStr;

use crate::errors::AppError;

/// Database services a Dokku host can export and import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseKind {
    Postgres,
    Mongo,
}

impl DatabaseKind {
    pub const ALL: [DatabaseKind; 2] = [DatabaseKind::Postgres, DatabaseKind::Mongo];

    /// Tag used on the command line, as the plugin namespace, and as the backup subdirectory.
    pub fn tag(self) -> &'static str {
        match self {
            DatabaseKind::Postgres => "postgres",
            DatabaseKind::Mongo => "mongo",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            DatabaseKind::Postgres => "sql",
            DatabaseKind::Mongo => "archive",
        }
    }

    pub fn export_procedure(self) -> String {
        format!("{}:export", self.tag())
    }

    pub fn import_procedure(self) -> String {
        format!("{}:import", self.tag())
    }

    /// `<dbname>_backup.<ext>`, shared by the local dump and the remote staging file.
    pub fn dump_file_name(self, db_name: &str) -> String {
        format!("{}_backup.{}", db_name, self.extension())
    }
}

impl FromStr for DatabaseKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "postgres" => Ok(DatabaseKind::Postgres),
            "mongo" => Ok(DatabaseKind::Mongo),
            other => Err(AppError::UnsupportedDatabaseKind(other.to_string())),
        }
    }
}

impl fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

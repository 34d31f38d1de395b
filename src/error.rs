use thiserror::Error;

use crate::models::{Association, StudentId};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("write rejected: {0}")]
    Rejected(String),

    #[error("unexpected stored value: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("student {0} is not loaded for this class")]
    UnknownStudent(StudentId),

    #[error("no class is loaded")]
    ClassNotLoaded,

    #[error("class {0} does not exist")]
    UnknownClass(i64),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

#[derive(Debug, Error)]
pub enum CatalogueError {
    #[error("failed to {action} {association} row for id {id}: {source}")]
    Commit {
        action: &'static str,
        association: Association,
        id: i64,
        #[source]
        source: GatewayError,
    },

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

pub type GatewayResult<T> = Result<T, GatewayError>;
pub type EngineResult<T> = Result<T, EngineError>;
pub type CatalogueResult<T> = Result<T, CatalogueError>;

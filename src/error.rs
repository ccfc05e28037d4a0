use thiserror::Error;

use crate::parcel::ParcelStatus;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Returned when a status string is not one of `registered`, `sent`, `delivered`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid parcel status '{0}'")]
pub struct ParseStatusError(pub String);

/// Errors produced by a [`ParcelStore`](crate::ParcelStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Status outside the closed set; raised before touching storage.
    #[error(transparent)]
    Validation(#[from] ParseStatusError),

    #[error("no parcel found with number {number}")]
    NotFound { number: i64 },

    /// The row exists but its status no longer allows the mutation.
    #[error("parcel {number} is '{status}', expected 'registered'")]
    PreconditionFailed { number: i64, status: ParcelStatus },

    #[error("{context}: {source}")]
    Read {
        context: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("{context}: {source}")]
    Write {
        context: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to open database at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },
}

impl StoreError {
    pub(crate) fn read(context: &'static str) -> impl FnOnce(rusqlite::Error) -> Self {
        move |source| Self::Read { context, source }
    }

    pub(crate) fn write(context: &'static str) -> impl FnOnce(rusqlite::Error) -> Self {
        move |source| Self::Write { context, source }
    }
}

//! Unified error type for the service layer and the HTTP boundary.
//!
//! Business-rule violations carry enough structure for the API layer to pick a
//! status code; infrastructure failures (database, I/O) are wrapped as-is and
//! only ever surface to clients as a generic 500.

use chrono::NaiveTime;
use rust_decimal::Decimal;
use thiserror::Error;

/// All errors produced by the crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or missing configuration.
    #[error("Configuration error: {message}")]
    Config {
        /// What was wrong
        message: String,
    },

    /// Underlying database failure.
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Filesystem failure (invoice documents, seed files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV writing failure.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Malformed or missing input.
    #[error("{message}")]
    Validation {
        /// Client-facing explanation
        message: String,
    },

    /// Monetary amount outside the accepted range.
    #[error("Invalid amount: {amount}")]
    InvalidAmount {
        /// The rejected amount
        amount: Decimal,
    },

    /// An allocation larger than what is left to allocate.
    #[error("Allocation of {requested} exceeds the available {available}")]
    OverAllocation {
        /// Amount the caller asked for
        requested: Decimal,
        /// Amount still available
        available: Decimal,
    },

    /// Ordering attempted outside the order window.
    #[error("Order window closed (cutoff {cutoff})")]
    OrderWindowClosed {
        /// Cutoff that applied to the request
        cutoff: NaiveTime,
    },

    /// Not enough stock left for a capped menu dish.
    #[error("Insufficient stock for {dish}: {remaining} remaining")]
    InsufficientStock {
        /// Dish name
        dish: String,
        /// Portions still available
        remaining: i32,
    },

    /// A state transition that the current state does not allow.
    #[error("{message}")]
    InvalidState {
        /// Client-facing explanation
        message: String,
    },

    /// Lookup of a missing record.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of record
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// Uniqueness or referential conflict.
    #[error("{message}")]
    Conflict {
        /// Client-facing explanation
        message: String,
    },

    /// Missing or invalid credentials.
    #[error("{message}")]
    Unauthorized {
        /// Client-facing explanation
        message: String,
    },

    /// Authenticated caller lacking the required privilege.
    #[error("{message}")]
    Forbidden {
        /// Client-facing explanation
        message: String,
    },

    /// Failure of a best-effort side effect (email).
    #[error("Notification error: {message}")]
    Notification {
        /// What failed
        message: String,
    },
}

impl Error {
    /// Shorthand for [`Error::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Shorthand for [`Error::NotFound`].
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Shorthand for [`Error::Conflict`].
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Shorthand for [`Error::Unauthorized`].
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Shorthand for [`Error::InvalidState`].
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Shorthand for [`Error::Forbidden`].
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;

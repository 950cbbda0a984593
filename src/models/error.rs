//! Error taxonomy for the template store.
//!
//! Client errors are caused by invalid caller input and are never retried.
//! Server errors wrap storage faults and preserve the original cause.
//! Plain absence on reads is modeled as `Ok(None)` / empty collections,
//! never as an error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("invalid template data: {0}")]
    Validation(String),

    #[error("notification template type '{display_name}' already exists for channel {channel}")]
    TypeAlreadyExists {
        display_name: String,
        channel: String,
    },

    #[error("notification template '{locale}' of type '{type_key}' already exists")]
    TemplateAlreadyExists { type_key: String, locale: String },

    #[error("notification template type '{0}' does not exist")]
    TypeNotFound(String),

    #[error("notification template '{locale}' of type '{type_key}' does not exist")]
    TemplateNotFound { type_key: String, locale: String },

    #[error("corrupt persisted template content: {0}")]
    CorruptContent(String),

    #[error("template storage failure: {0}")]
    Storage(#[source] anyhow::Error),
}

impl TemplateError {
    /// True for errors attributable to caller input; false for storage
    /// faults and corrupt persisted state.
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            TemplateError::Storage(_) | TemplateError::CorruptContent(_)
        )
    }

    pub(crate) fn storage(context: &str, err: impl Into<anyhow::Error>) -> Self {
        TemplateError::Storage(err.into().context(context.to_string()))
    }
}

impl From<sqlx::Error> for TemplateError {
    fn from(err: sqlx::Error) -> Self {
        TemplateError::Storage(err.into())
    }
}

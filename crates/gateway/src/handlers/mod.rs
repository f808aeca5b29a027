//! API handlers module

use expertscope_common::errors::AppError;
use validator::ValidationErrors;

pub mod ask;
pub mod experts;
pub mod health;
pub mod search;

/// Surface the first failed rule with its declared message
pub(crate) fn bad_request(errors: ValidationErrors) -> AppError {
    for (field, failures) in errors.field_errors() {
        if let Some(message) = failures.iter().find_map(|failure| failure.message.clone()) {
            return AppError::Validation {
                message: message.into_owned(),
                field: Some(field.to_string()),
            };
        }
    }

    AppError::Validation {
        message: errors.to_string(),
        field: None,
    }
}

//! Error types
//!
//! Errors raised by the data access layer and their translation from the
//! AWS SDK.

pub mod types;

pub use types::{
    DbError, Result, CONDITIONAL_CHECK_FAILED, RESOURCE_IN_USE, RESOURCE_NOT_FOUND, VALIDATION,
};

#[cfg(test)]
mod tests {
    use crate::error::{
        DbError, CONDITIONAL_CHECK_FAILED, RESOURCE_IN_USE, RESOURCE_NOT_FOUND, VALIDATION,
    };

    #[test]
    fn test_error_codes_available_from_module_root() {
        assert!(DbError::service(RESOURCE_NOT_FOUND, "Table not found").is_not_found());
        assert!(DbError::service(CONDITIONAL_CHECK_FAILED, "Condition failed")
            .is_conditional_check_failed());
        assert_eq!(DbError::service(RESOURCE_IN_USE, "busy").code(), RESOURCE_IN_USE);
        assert_eq!(DbError::service(VALIDATION, "bad").code(), VALIDATION);
    }
}

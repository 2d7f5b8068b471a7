//! Canonical logging macros
//!
//! These macros provide a structured, consistent way to log session operations.

/// Log the start of an operation
///
/// # Example
///
/// ```
/// # use rowkeep_core::log_op_start;
/// log_op_start!("persist");
/// log_op_start!("persist", entity_type = "User");
/// ```
#[macro_export]
macro_rules! log_op_start {
    ($op:expr) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::rowkeep_core_types::schema::EVENT_START,
        );
    };
    ($op:expr, $($field:tt)*) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::rowkeep_core_types::schema::EVENT_START,
            $($field)*
        );
    };
}

/// Log the successful end of an operation
///
/// # Example
///
/// ```
/// # use rowkeep_core::log_op_end;
/// log_op_end!("persist", duration_ms = 3);
/// ```
#[macro_export]
macro_rules! log_op_end {
    ($op:expr, duration_ms = $duration:expr) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::rowkeep_core_types::schema::EVENT_END,
            duration_ms = $duration,
        );
    };
    ($op:expr, duration_ms = $duration:expr, $($field:tt)*) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::rowkeep_core_types::schema::EVENT_END,
            duration_ms = $duration,
            $($field)*
        );
    };
}

/// Log an operation error
///
/// # Example
///
/// ```
/// # use rowkeep_core::log_op_error;
/// # use rowkeep_core::errors::{RkError, RkErrorKind};
/// let err = RkError::new(RkErrorKind::NotEntity);
/// log_op_error!("find_by_key", &err, duration_ms = 1);
/// ```
#[macro_export]
macro_rules! log_op_error {
    ($op:expr, $err:expr, duration_ms = $duration:expr) => {{
        let rk_err: &$crate::errors::RkError = $err;
        tracing::error!(
            component = module_path!(),
            op = $op,
            event = $crate::rowkeep_core_types::schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err_kind = ?rk_err.kind(),
            err_code = rk_err.code(),
            err_message = rk_err.message(),
        );
    }};
    ($op:expr, $err:expr, duration_ms = $duration:expr, $($field:tt)*) => {{
        let rk_err: &$crate::errors::RkError = $err;
        tracing::error!(
            component = module_path!(),
            op = $op,
            event = $crate::rowkeep_core_types::schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err_kind = ?rk_err.kind(),
            err_code = rk_err.code(),
            err_message = rk_err.message(),
            $($field)*
        );
    }};
}

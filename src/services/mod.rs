// src/services/mod.rs
//
// Core domain logic. Handlers stay thin; every lifecycle invariant and
// derived computation lives here.

pub mod attempts;
pub mod diagnosis;
pub mod retry;
pub mod scoring;
pub mod training;

use crate::error::AppError;

/// Ownership check applied before every user-scoped read or write,
/// independent of any network-layer auth.
pub(crate) fn ensure_owner(owner_id: i64, user_id: i64) -> Result<(), AppError> {
    if owner_id != user_id {
        return Err(AppError::Forbidden(
            "resource belongs to another user".to_string(),
        ));
    }
    Ok(())
}

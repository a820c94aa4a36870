// approval.rs — Checks a human's response against what the gate demanded.

use serde::{Deserialize, Serialize};

use crate::config::SecurityConfig;
use crate::error::ApprovalError;
use crate::gate::ReviewResult;

/// What the reviewer supplied for one action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalResponse {
    pub confirmed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,
}

impl ApprovalResponse {
    pub fn confirmed() -> Self {
        Self {
            confirmed: true,
            pin: None,
        }
    }

    pub fn with_pin(mut self, pin: impl Into<String>) -> Self {
        self.pin = Some(pin.into());
        self
    }
}

/// Allow the action only if `response` satisfies `review`.
///
/// A failed check denies this action only; the caller may ask again.
pub fn authorize(
    review: &ReviewResult,
    response: &ApprovalResponse,
    config: &dyn SecurityConfig,
) -> Result<(), ApprovalError> {
    if review.requires_click && !response.confirmed {
        return Err(ApprovalError::ConfirmationRequired);
    }
    if review.requires_pin {
        let pin = response.pin.as_deref().ok_or(ApprovalError::PinRequired)?;
        if !constant_time_eq(pin.as_bytes(), config.approval_pin().as_bytes()) {
            tracing::warn!(level = %review.level, "approval PIN mismatch");
            return Err(ApprovalError::PinMismatch);
        }
    }
    Ok(())
}

/// Compare without short-circuiting on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

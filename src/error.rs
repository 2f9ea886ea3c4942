/*!
Error taxonomy for the Cerberus core.

Two tiers, matching the severity split the simulator actually needs:
- `Config`: raised during construction (sketch sizing, share allocation,
  table shape). Fatal, never partially constructs the offending object.
- `Invariant`: raised when a runtime precondition the orchestrator itself is
  responsible for maintaining is violated (unknown task id, unknown
  operation label). These indicate a programmer error, not a data problem,
  and are not expected to be caught by callers.

Recoverable saturation (a CMS cell pinned at its max, or the control-plane
channel budget running dry for the rest of a subtick) is by design not an
error at all: it is folded into statistics and `log::debug!`/`log::trace!`
call sites instead of `Result`.
*/

#[derive(Debug, thiserror::Error)]
pub enum CerberusError {
    #[error("config: {0}")]
    Config(String),

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("invalid configuration json: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CerberusError>;

/// Raises a `CerberusError::Invariant` and logs it before returning.
///
/// Runtime invariants (task id out of range, unknown operation label) are
/// programmer errors per the spec's error taxonomy; they terminate the
/// simulation step rather than attempting to recover.
macro_rules! invariant {
    ($cond:expr, $($msg:tt)*) => {
        if !$cond {
            let message = format!($($msg)*);
            log::error!("invariant violated: {message}");
            return Err(crate::error::CerberusError::Invariant(message));
        }
    };
}
pub(crate) use invariant;

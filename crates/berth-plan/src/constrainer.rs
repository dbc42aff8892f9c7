//! Rate limiting hook for recovery launches.

use berth_core::{Operation, RecoveryType};

/// Decides whether a recovery of a given type may launch now, and is told
/// when one did.
///
/// Errors are treated as "cannot launch" by callers.
pub trait LaunchConstrainer: Send + Sync {
    fn can_launch(&self, recovery_type: RecoveryType) -> anyhow::Result<bool>;

    fn launch_happened(
        &self,
        operation: &Operation,
        recovery_type: RecoveryType,
    ) -> anyhow::Result<()>;
}

//! berth-recovery — relaunching failed pods.
//!
//! The [`RecoveryPlanManager`] has no fixed plan. Every offer cycle it scans
//! the task store for failed tasks, groups them by pod, classifies each pod
//! as transiently or permanently failed, and merges freshly generated
//! phases into its plan by name so recoveries already in flight are kept.
//!
//! # Components
//!
//! - **`manager`**: the recovery plan manager
//! - **`monitor`**: `FailureMonitor`, deciding when a failed task is lost for good
//! - **`constrain`**: `LaunchConstrainer` implementations rate-limiting replacements
//! - **`overrider`**: `RecoveryPlanOverrider` for custom phases for specific pods
//! - **`policy`**: wiring monitor and constrainer from configuration

pub mod constrain;
pub mod error;
pub mod manager;
pub mod monitor;
pub mod overrider;
pub mod policy;

pub use constrain::{TestingLaunchConstrainer, TimedLaunchConstrainer, UnconstrainedLaunchConstrainer};
pub use error::{RecoveryError, RecoveryResult};
pub use manager::{RECOVERY_PLAN_NAME, RecoveryPlanManager};
pub use monitor::{FailureMonitor, NeverFailureMonitor, TestingFailureMonitor, TimedFailureMonitor};
pub use overrider::RecoveryPlanOverrider;
pub use policy::RecoveryPolicy;

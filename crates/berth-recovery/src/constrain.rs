//! Launch constrainers — rate limits on recovery launches.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use berth_core::{Operation, RecoveryType};
use berth_plan::LaunchConstrainer;
use tracing::{debug, info};

/// Never holds a launch back.
#[derive(Debug, Default)]
pub struct UnconstrainedLaunchConstrainer;

impl LaunchConstrainer for UnconstrainedLaunchConstrainer {
    fn can_launch(&self, _recovery_type: RecoveryType) -> anyhow::Result<bool> {
        Ok(true)
    }

    fn launch_happened(&self, _operation: &Operation, _recovery_type: RecoveryType) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Spaces permanent replacements at least `min_delay` apart. Transient
/// relaunches are never held back.
#[derive(Debug)]
pub struct TimedLaunchConstrainer {
    min_delay: Duration,
    last_permanent_launch: Mutex<Option<Instant>>,
}

impl TimedLaunchConstrainer {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            last_permanent_launch: Mutex::new(None),
        }
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    fn last_launch(&self) -> anyhow::Result<std::sync::MutexGuard<'_, Option<Instant>>> {
        self.last_permanent_launch
            .lock()
            .map_err(|_| anyhow::anyhow!("launch history lock poisoned"))
    }
}

impl LaunchConstrainer for TimedLaunchConstrainer {
    fn can_launch(&self, recovery_type: RecoveryType) -> anyhow::Result<bool> {
        if recovery_type != RecoveryType::Permanent {
            return Ok(true);
        }
        let allowed = match *self.last_launch()? {
            Some(last) => last.elapsed() >= self.min_delay,
            None => true,
        };
        if !allowed {
            debug!(min_delay = ?self.min_delay, "permanent replacement held back");
        }
        Ok(allowed)
    }

    fn launch_happened(&self, operation: &Operation, recovery_type: RecoveryType) -> anyhow::Result<()> {
        if recovery_type == RecoveryType::Permanent {
            *self.last_launch()? = Some(Instant::now());
            info!(offer = %operation.offer_id, "permanent replacement launched");
        }
        Ok(())
    }
}

/// Switchable constrainer that records every launch it is told about.
#[derive(Debug)]
pub struct TestingLaunchConstrainer {
    can_launch: AtomicBool,
    failing: AtomicBool,
    launches: Mutex<Vec<(Operation, RecoveryType)>>,
}

impl Default for TestingLaunchConstrainer {
    fn default() -> Self {
        Self {
            can_launch: AtomicBool::new(true),
            failing: AtomicBool::new(false),
            launches: Mutex::new(Vec::new()),
        }
    }
}

impl TestingLaunchConstrainer {
    pub fn set_can_launch(&self, can_launch: bool) {
        self.can_launch.store(can_launch, Ordering::SeqCst);
    }

    /// Make `can_launch` return an error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn launches(&self) -> Vec<(Operation, RecoveryType)> {
        self.launches
            .lock()
            .map(|l| l.clone())
            .unwrap_or_default()
    }

    pub fn launch_count(&self, recovery_type: RecoveryType) -> usize {
        self.launches()
            .iter()
            .filter(|(_, t)| *t == recovery_type)
            .count()
    }
}

impl LaunchConstrainer for TestingLaunchConstrainer {
    fn can_launch(&self, _recovery_type: RecoveryType) -> anyhow::Result<bool> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("constrainer unavailable");
        }
        Ok(self.can_launch.load(Ordering::SeqCst))
    }

    fn launch_happened(&self, operation: &Operation, recovery_type: RecoveryType) -> anyhow::Result<()> {
        self.launches
            .lock()
            .map_err(|_| anyhow::anyhow!("launch log lock poisoned"))?
            .push((operation.clone(), recovery_type));
        Ok(())
    }
}

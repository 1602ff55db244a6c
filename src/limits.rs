use std::sync::Mutex;

use log::warn;

/// Result of a plan-limit query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitCheck {
    pub allowed: bool,
    /// Generations remaining after the requested count, `None` = unlimited.
    pub remaining: Option<u32>,
}

/// Plan/permission queries consulted before settings changes or submission.
///
/// Treated as pure, side-effect-free queries by the session; the optimistic
/// usage debit is a separate, explicit call.
pub trait CapabilityCheck {
    /// Whether the plan allows more than one image per submission.
    fn can_use_bulk_generation(&self) -> bool;

    /// Whether `count` more generations fit within the plan.
    fn check_generation_limits(&self, count: u32) -> LimitCheck;
}

/// Plan-backed capability source with a locally tracked usage counter.
///
/// The counter is decremented optimistically on submission and is never
/// rolled back on failure; [`PlanLimits::note_unreconciled`] records the
/// drift so it is at least visible in logs.
#[derive(Debug)]
pub struct PlanLimits {
    bulk_generation: bool,
    remaining: Mutex<Option<u32>>,
}

impl PlanLimits {
    /// A plan with a fixed generation budget.
    pub fn with_budget(remaining: u32, bulk_generation: bool) -> Self {
        Self {
            bulk_generation,
            remaining: Mutex::new(Some(remaining)),
        }
    }

    /// A plan with no generation cap.
    pub fn unlimited() -> Self {
        Self {
            bulk_generation: true,
            remaining: Mutex::new(None),
        }
    }

    /// Current remaining budget, `None` = unlimited.
    pub fn remaining(&self) -> Option<u32> {
        *self.remaining.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Optimistically debit `count` generations. Saturates at zero.
    pub fn debit(&self, count: u32) {
        let mut remaining = self.remaining.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(r) = remaining.as_mut() {
            *r = r.saturating_sub(count);
        }
    }

    /// Record that a debit was never confirmed by the server. The counter is
    /// deliberately not restored; local and server counts may now disagree
    /// until the next authoritative refresh.
    pub fn note_unreconciled(&self, count: u32) {
        warn!(
            "usage counter debited {count} for a failed submission; local count may drift until refreshed"
        );
    }

    /// Replace the local counter with an authoritative server value.
    pub fn refresh(&self, remaining: Option<u32>) {
        *self.remaining.lock().unwrap_or_else(|e| e.into_inner()) = remaining;
    }
}

impl CapabilityCheck for PlanLimits {
    fn can_use_bulk_generation(&self) -> bool {
        self.bulk_generation
    }

    fn check_generation_limits(&self, count: u32) -> LimitCheck {
        match self.remaining() {
            None => LimitCheck {
                allowed: true,
                remaining: None,
            },
            Some(r) => LimitCheck {
                allowed: count <= r,
                remaining: Some(r.saturating_sub(count)),
            },
        }
    }
}

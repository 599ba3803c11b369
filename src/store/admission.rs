//! Admission Controller
//!
//! Bounds the number of store operations executing at once.
//!
//! # Design
//!
//! Two gates, both of which must pass, checked in order:
//!
//! 1. Fast-fail tier: an atomic in-flight counter with a hard cap. A burst
//!    past the cap is rejected immediately without waiting.
//! 2. Timed tier: a FIFO-fair counting semaphore. The caller waits at most
//!    `timeout` for a slot, then gives up.
//!
//! Both tiers are released by dropping the returned [`AdmissionPermit`], so
//! release runs on every exit path of the guarded operation, including panics
//! and cancelled futures.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{trace, warn};

use super::{DEFAULT_ADMISSION_TIMEOUT, DEFAULT_MAX_CONCURRENT};
use crate::error::{Error, OverloadReason, Result};
use crate::metrics;

/// Admission configuration
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    /// Hard cap on in-flight operations (fast-fail tier)
    pub max_active: usize,
    /// Slots in the timed tier; normally equal to `max_active`
    pub slots: usize,
    /// Longest wait for a slot
    pub timeout: Duration,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_active: DEFAULT_MAX_CONCURRENT,
            slots: DEFAULT_MAX_CONCURRENT,
            timeout: DEFAULT_ADMISSION_TIMEOUT,
        }
    }
}

impl AdmissionConfig {
    /// Config with both tiers sized to `capacity`
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            max_active: capacity,
            slots: capacity,
            ..Default::default()
        }
    }

    /// Set the slot wait timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Reject configurations that would admit nothing
    pub fn validate(&self) -> Result<()> {
        if self.max_active == 0 {
            return Err(Error::Config("max_active must be at least 1".to_string()));
        }
        if self.slots == 0 || self.slots > Semaphore::MAX_PERMITS {
            return Err(Error::Config(format!(
                "slots must be between 1 and {}",
                Semaphore::MAX_PERMITS
            )));
        }
        Ok(())
    }
}

/// Point-in-time admission statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionStats {
    /// Hard cap on in-flight operations
    pub max_active: usize,
    /// Operations currently holding or waiting for a slot
    pub active: usize,
    /// Free slots in the timed tier
    pub available_slots: usize,
    /// Successful admissions
    pub admitted: u64,
    /// Rejected by the fast-fail tier
    pub rejected_capacity: u64,
    /// Rejected after waiting out the timeout
    pub rejected_timeout: u64,
}

/// Counter reservation in the fast-fail tier. Undone on drop.
struct ActiveReservation {
    active: Arc<AtomicUsize>,
}

impl ActiveReservation {
    fn reserve(active: &Arc<AtomicUsize>, max_active: usize) -> Option<Self> {
        let reservation = Self {
            active: Arc::clone(active),
        };
        let now_active = active.fetch_add(1, Ordering::AcqRel) + 1;
        if now_active > max_active {
            // dropping the reservation decrements again
            return None;
        }
        Some(reservation)
    }
}

impl Drop for ActiveReservation {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Proof of admission. Dropping it releases both tiers exactly once.
pub struct AdmissionPermit {
    _slot: OwnedSemaphorePermit,
    _reservation: ActiveReservation,
    admitted_at: Instant,
}

impl AdmissionPermit {
    /// Time since the permit was granted
    pub fn held_for(&self) -> Duration {
        self.admitted_at.elapsed()
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        metrics::INFLIGHT_OPERATIONS.dec();
    }
}

impl std::fmt::Debug for AdmissionPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionPermit")
            .field("held_for", &self.held_for())
            .finish()
    }
}

/// Bounded-concurrency gate in front of every store operation
pub struct AdmissionController {
    config: AdmissionConfig,
    /// In-flight counter (fast-fail tier)
    active: Arc<AtomicUsize>,
    /// Slot pool (timed tier)
    slots: Arc<Semaphore>,
    admitted: AtomicU64,
    rejected_capacity: AtomicU64,
    rejected_timeout: AtomicU64,
}

impl AdmissionController {
    /// Create a controller with default configuration
    pub fn new() -> Self {
        Self::with_config(AdmissionConfig::default())
    }

    /// Create a controller with custom configuration
    pub fn with_config(config: AdmissionConfig) -> Self {
        Self {
            active: Arc::new(AtomicUsize::new(0)),
            slots: Arc::new(Semaphore::new(config.slots)),
            config,
            admitted: AtomicU64::new(0),
            rejected_capacity: AtomicU64::new(0),
            rejected_timeout: AtomicU64::new(0),
        }
    }

    /// Reserve a slot for one operation.
    ///
    /// Fails with [`Error::Overloaded`] when the in-flight cap is reached or
    /// no slot frees up within the configured timeout. A failed or cancelled
    /// acquisition holds nothing afterwards.
    pub async fn acquire(&self) -> Result<AdmissionPermit> {
        let start = Instant::now();

        let reservation = match ActiveReservation::reserve(&self.active, self.config.max_active)
        {
            Some(r) => r,
            None => {
                self.rejected_capacity.fetch_add(1, Ordering::Relaxed);
                return Err(self.reject(OverloadReason::CapacityExceeded, start));
            }
        };

        let slot = tokio::time::timeout(self.config.timeout, self.slots.clone().acquire_owned())
            .await;

        match slot {
            Ok(Ok(slot)) => {
                self.admitted.fetch_add(1, Ordering::Relaxed);
                metrics::INFLIGHT_OPERATIONS.inc();
                trace!(waited_us = start.elapsed().as_micros() as u64, "admitted");
                Ok(AdmissionPermit {
                    _slot: slot,
                    _reservation: reservation,
                    admitted_at: Instant::now(),
                })
            }
            // The pool is owned here and never closed
            Ok(Err(e)) => Err(Error::Internal(format!("admission slot pool: {}", e))),
            Err(_) => {
                drop(reservation);
                self.rejected_timeout.fetch_add(1, Ordering::Relaxed);
                Err(self.reject(OverloadReason::Timeout, start))
            }
        }
    }

    fn reject(&self, reason: OverloadReason, start: Instant) -> Error {
        let waited = start.elapsed();
        warn!(
            reason = %reason,
            waited_ms = waited.as_millis() as u64,
            active = self.active(),
            "Admission refused"
        );
        metrics::ADMISSION_REJECTIONS
            .with_label_values(&[reason.as_str()])
            .inc();
        Error::Overloaded { reason, waited }
    }

    /// Operations currently admitted or waiting for a slot
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Free slots in the timed tier
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Hard cap on in-flight operations
    pub fn capacity(&self) -> usize {
        self.config.max_active
    }

    /// Configuration in use
    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// Snapshot of counters
    pub fn stats(&self) -> AdmissionStats {
        AdmissionStats {
            max_active: self.config.max_active,
            active: self.active(),
            available_slots: self.available_slots(),
            admitted: self.admitted.load(Ordering::Relaxed),
            rejected_capacity: self.rejected_capacity.load(Ordering::Relaxed),
            rejected_timeout: self.rejected_timeout.load(Ordering::Relaxed),
        }
    }
}

impl Default for AdmissionController {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn controller(max_active: usize, slots: usize, timeout_ms: u64) -> AdmissionController {
        AdmissionController::with_config(AdmissionConfig {
            max_active,
            slots,
            timeout: Duration::from_millis(timeout_ms),
        })
    }

    #[test]
    fn test_default_config() {
        let config = AdmissionConfig::default();
        assert_eq!(config.max_active, 1000);
        assert_eq!(config.slots, 1000);
        assert_eq!(config.timeout, Duration::from_millis(1000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        assert_matches!(
            AdmissionConfig::with_capacity(0).validate(),
            Err(Error::Config(_))
        );
        let config = AdmissionConfig {
            slots: 0,
            ..Default::default()
        };
        assert_matches!(config.validate(), Err(Error::Config(_)));
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let admission = controller(2, 2, 100);

        let permit = admission.acquire().await.unwrap();
        assert_eq!(admission.active(), 1);
        assert_eq!(admission.available_slots(), 1);

        drop(permit);
        assert_eq!(admission.active(), 0);
        assert_eq!(admission.available_slots(), 2);
        assert_eq!(admission.stats().admitted, 1);
    }

    #[tokio::test]
    async fn test_fast_fail_at_capacity() {
        let admission = controller(2, 2, 5_000);

        let _a = admission.acquire().await.unwrap();
        let _b = admission.acquire().await.unwrap();

        let start = Instant::now();
        let err = admission.acquire().await.unwrap_err();
        assert_matches!(
            err,
            Error::Overloaded {
                reason: OverloadReason::CapacityExceeded,
                ..
            }
        );
        // Did not wait for the 5s slot timeout
        assert!(start.elapsed() < Duration::from_secs(1));

        // Rejected attempt leaked nothing
        assert_eq!(admission.active(), 2);
        assert_eq!(admission.stats().rejected_capacity, 1);
    }

    #[tokio::test]
    async fn test_admits_again_after_release() {
        let admission = controller(1, 1, 10);

        let held = admission.acquire().await.unwrap();
        assert!(admission.acquire().await.is_err());

        drop(held);
        assert!(admission.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_timed_tier_times_out() {
        // Counter allows 4 but only 1 slot exists
        let admission = controller(4, 1, 20);

        let _held = admission.acquire().await.unwrap();
        let err = admission.acquire().await.unwrap_err();
        assert_matches!(
            err,
            Error::Overloaded {
                reason: OverloadReason::Timeout,
                waited,
            } if waited >= Duration::from_millis(20)
        );

        assert_eq!(admission.active(), 1);
        assert_eq!(admission.stats().rejected_timeout, 1);
    }

    #[tokio::test]
    async fn test_waiter_gets_slot_when_released() {
        let admission = Arc::new(controller(4, 1, 2_000));

        let held = admission.acquire().await.unwrap();

        let waiter = {
            let admission = Arc::clone(&admission);
            tokio::spawn(async move { admission.acquire().await.map(|_| ()) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(admission.active(), 2);
        drop(held);

        assert!(waiter.await.unwrap().is_ok());
        assert_eq!(admission.active(), 0);
    }

    #[tokio::test]
    async fn test_waiter_is_woken_by_release() {
        let admission = controller(4, 1, 10_000);
        let held = admission.acquire().await.unwrap();

        let mut waiter = tokio_test::task::spawn(admission.acquire());
        tokio_test::assert_pending!(waiter.poll());

        drop(held);
        assert!(waiter.is_woken());
        let permit = tokio_test::assert_ready_ok!(waiter.poll());
        assert!(permit.held_for() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_cancelled_acquire_restores_counter() {
        let admission = controller(4, 1, 10_000);
        let _held = admission.acquire().await.unwrap();

        // Caller gives up long before the admission timeout
        let outcome = tokio::time::timeout(Duration::from_millis(20), admission.acquire()).await;
        assert!(outcome.is_err());

        assert_eq!(admission.active(), 1);
        assert_eq!(admission.available_slots(), 0);
    }

    #[tokio::test]
    async fn test_release_on_panic() {
        let admission = Arc::new(controller(1, 1, 10));

        let task = {
            let admission = Arc::clone(&admission);
            tokio::spawn(async move {
                let _permit = admission.acquire().await.unwrap();
                panic!("fault while admitted");
            })
        };
        assert!(task.await.is_err());

        assert_eq!(admission.active(), 0);
        assert!(admission.acquire().await.is_ok());
    }
}

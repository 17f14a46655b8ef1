//! Admission capability shared by the real limiter and its stand-ins.

use std::sync::Arc;

use super::key::ClientKey;
use super::limiter::{Decision, FixedWindowLimiter};

/// Trait for admission control implementations.
///
/// The HTTP middleware only depends on this trait, so downstream handlers
/// can be tested against [`AlwaysAdmit`] without any timing logic.
pub trait AdmissionControl: Send + Sync {
    /// Decide whether a request from `key` may proceed.
    fn allow(&self, key: &ClientKey) -> Decision;
}

/// Admission control that admits every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAdmit;

impl AdmissionControl for AlwaysAdmit {
    fn allow(&self, _key: &ClientKey) -> Decision {
        Decision::admit()
    }
}

impl AdmissionControl for FixedWindowLimiter {
    fn allow(&self, key: &ClientKey) -> Decision {
        FixedWindowLimiter::allow(self, key)
    }
}

/// An absent limiter admits everything.
impl<T: AdmissionControl> AdmissionControl for Option<T> {
    fn allow(&self, key: &ClientKey) -> Decision {
        match self {
            Some(inner) => inner.allow(key),
            None => Decision::admit(),
        }
    }
}

impl<T: AdmissionControl + ?Sized> AdmissionControl for Arc<T> {
    fn allow(&self, key: &ClientKey) -> Decision {
        (**self).allow(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn exhaust(control: &dyn AdmissionControl, key: &ClientKey, calls: usize) -> usize {
        (0..calls).filter(|_| control.allow(key).admitted).count()
    }

    #[test]
    fn test_always_admit() {
        let key = ClientKey::from("192.168.1.1");
        assert_eq!(exhaust(&AlwaysAdmit, &key, 100), 100);
    }

    #[test]
    fn test_absent_limiter_admits() {
        let limiter: Option<FixedWindowLimiter> = None;
        let key = ClientKey::from("192.168.1.1");
        assert_eq!(exhaust(&limiter, &key, 50), 50);
    }

    #[test]
    fn test_present_limiter_enforces() {
        let limiter = Some(FixedWindowLimiter::new(3, Duration::from_secs(60)).unwrap());
        let key = ClientKey::from("192.168.1.1");
        assert_eq!(exhaust(&limiter, &key, 10), 3);
    }

    #[test]
    fn test_shared_trait_object() {
        let limiter = FixedWindowLimiter::new(2, Duration::from_secs(60)).unwrap();
        let shared: Arc<dyn AdmissionControl> = Arc::new(limiter);
        let key = ClientKey::from("192.168.1.1");

        let clone = shared.clone();
        assert!(shared.allow(&key).admitted);
        assert!(clone.allow(&key).admitted);
        assert!(!shared.allow(&key).admitted);
    }
}

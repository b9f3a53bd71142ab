//! Runtime invariants with a checked-log for contract tests.
//!
//! Scorers and the flow machine assert their invariants through
//! [`assert_invariant!`]. Every check is recorded per thread, so a contract
//! test can prove that a scenario actually exercised the invariants it claims
//! to cover, not just that nothing panicked.
//!
//! ```rust,ignore
//! use idcapture::invariant_ppt::{contract_test, clear_invariant_log, invariants};
//!
//! clear_invariant_log();
//! // ... drive the readiness scorer ...
//! contract_test("readiness", &[invariants::SCORE_BOUNDED]);
//! ```

use std::cell::RefCell;
use std::collections::HashSet;
use std::thread_local;

/// Invariant messages shared between the assertions and the contract tests.
pub mod invariants {
    pub const SCORE_BOUNDED: &str = "readiness score stays within [0, score_max]";
    pub const SCORE_STEP: &str = "readiness score moves by at most one step plus bonus per cycle";
    pub const FIRE_COOLDOWN: &str = "readiness fires are separated by more than the cooldown";
    pub const BACK_REQUIRES_MRZ: &str = "back step never fires without MRZ presence";
    pub const HOLD_BOUNDED: &str = "ovd hold counter stays within [0, hold_max]";
    pub const OVD_DWELL: &str = "ovd hit never precedes the minimum dwell";
    pub const OVD_WHITE_OUT: &str = "white-out frames never pass the ovd detector";
    pub const SINGLE_FLIGHT: &str = "at most one photo request and one verification are in flight";
    pub const MOVEMENT_BOUNDED: &str = "movement score stays within [0, movement_max]";
}

thread_local! {
    static INVARIANT_LOG: RefCell<HashSet<String>> = RefCell::new(HashSet::new());
}

/// Assert an invariant and record that it was checked.
///
/// # Panics
/// Panics if the condition is false.
#[macro_export]
macro_rules! assert_invariant {
    ($condition:expr, $message:expr) => {
        $crate::invariant_ppt::__assert_invariant_impl($condition, $message, None)
    };
    ($condition:expr, $message:expr, $context:expr) => {
        $crate::invariant_ppt::__assert_invariant_impl($condition, $message, Some($context))
    };
}

#[doc(hidden)]
pub fn __assert_invariant_impl(condition: bool, message: &str, context: Option<&str>) {
    INVARIANT_LOG.with(|log| {
        log.borrow_mut().insert(message.to_string());
    });

    if !condition {
        let ctx = context.unwrap_or("unknown");
        panic!("INVARIANT VIOLATION [{}]: {}", ctx, message);
    }
}

/// Panics unless every listed invariant was checked on this thread.
pub fn contract_test(test_name: &str, required_invariants: &[&str]) {
    let missing: Vec<&str> = INVARIANT_LOG.with(|log| {
        let log = log.borrow();
        required_invariants
            .iter()
            .copied()
            .filter(|inv| !log.contains(*inv))
            .collect()
    });

    if !missing.is_empty() {
        panic!(
            "CONTRACT FAILURE [{}]: invariants never checked:\n  - {}",
            test_name,
            missing.join("\n  - ")
        );
    }
}

/// Whether a given invariant has been checked on this thread.
pub fn was_checked(message: &str) -> bool {
    INVARIANT_LOG.with(|log| log.borrow().contains(message))
}

pub fn clear_invariant_log() {
    INVARIANT_LOG.with(|log| log.borrow_mut().clear());
}

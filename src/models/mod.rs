//! Domain model module declarations.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

pub mod agent;
pub mod journal;
pub mod monitoring;
pub mod sequence;
pub mod tasks;

/// Last millisecond stamp handed out by [`instance_id`].
static LAST_STAMP: AtomicI64 = AtomicI64::new(0);

/// Build a process-unique identifier of the form `<name>-<millis>`.
///
/// The millisecond stamp is forced to be strictly increasing, so two
/// requests inside the same millisecond still receive distinct ids.
#[must_use]
pub fn instance_id(name: &str) -> String {
    let now = Utc::now().timestamp_millis();
    let mut previous = LAST_STAMP.load(Ordering::SeqCst);
    loop {
        let next = now.max(previous + 1);
        match LAST_STAMP.compare_exchange(previous, next, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => return format!("{name}-{next}"),
            Err(actual) => previous = actual,
        }
    }
}

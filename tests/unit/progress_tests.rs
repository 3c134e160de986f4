//! Unit tests for progress throttling.

use chunker_host::stager::progress::ProgressThrottle;

/// Reports fire only after more than 1% of the work has completed.
#[test]
fn reports_after_more_than_one_percent() {
    let mut throttle = ProgressThrottle::new(100);
    assert_eq!(throttle.advance(1), None);
    assert_eq!(throttle.advance(1), Some(0.02));
    assert_eq!(throttle.advance(1), None);
    assert_eq!(throttle.advance(1), Some(0.04));
}

/// Completion is clamped to the total.
#[test]
fn completion_is_clamped() {
    let mut throttle = ProgressThrottle::new(100);
    assert_eq!(throttle.advance(250), Some(1.0));
    assert_eq!(throttle.advance(1), None);
}

/// Zero total never reports.
#[test]
fn zero_total_is_silent() {
    let mut throttle = ProgressThrottle::new(0);
    assert_eq!(throttle.advance(10), None);
}

use chrono::{DateTime, Duration, Utc};

/// Review interval when the attempt has no score at all.
pub const UNSCORED_INTERVAL_DAYS: i64 = 1;
/// Review interval for scores below [`REVIEW_THRESHOLD`].
pub const RELEARN_INTERVAL_DAYS: i64 = 3;
/// Review interval for scores in `[REVIEW_THRESHOLD, MASTERY_THRESHOLD)`.
pub const REVIEW_INTERVAL_DAYS: i64 = 7;
/// Review interval for scores at or above [`MASTERY_THRESHOLD`].
pub const MASTERY_INTERVAL_DAYS: i64 = 30;

pub const REVIEW_THRESHOLD: f64 = 80.0;
pub const MASTERY_THRESHOLD: f64 = 90.0;

/// Computes the next review date for a finalized attempt.
///
/// The policy is fixed and not user-configurable. Total over the whole
/// input domain: out-of-range scores fall into their bracket per the
/// comparisons below, and a NaN score counts as absent. Deterministic for
/// any given `(score, reference)` pair.
pub fn next_due(score: Option<f64>, reference: DateTime<Utc>) -> DateTime<Utc> {
    let days = match score {
        None => UNSCORED_INTERVAL_DAYS,
        Some(s) if s.is_nan() => UNSCORED_INTERVAL_DAYS,
        Some(s) if s < REVIEW_THRESHOLD => RELEARN_INTERVAL_DAYS,
        Some(s) if s < MASTERY_THRESHOLD => REVIEW_INTERVAL_DAYS,
        Some(_) => MASTERY_INTERVAL_DAYS,
    };
    reference + Duration::days(days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn absent_score_is_due_next_day() {
        assert_eq!(next_due(None, reference()), reference() + Duration::days(1));
    }

    #[test]
    fn low_score_is_due_in_three_days() {
        assert_eq!(
            next_due(Some(0.0), reference()),
            reference() + Duration::days(3)
        );
        assert_eq!(
            next_due(Some(79.999), reference()),
            reference() + Duration::days(3)
        );
    }

    #[test]
    fn review_bracket_is_due_in_seven_days() {
        // 80.0 belongs to the higher bracket (closed-open intervals).
        assert_eq!(
            next_due(Some(80.0), reference()),
            reference() + Duration::days(7)
        );
        assert_eq!(
            next_due(Some(85.0), reference()),
            reference() + Duration::days(7)
        );
        assert_eq!(
            next_due(Some(89.999), reference()),
            reference() + Duration::days(7)
        );
    }

    #[test]
    fn mastery_bracket_is_due_in_thirty_days() {
        assert_eq!(
            next_due(Some(90.0), reference()),
            reference() + Duration::days(30)
        );
        assert_eq!(
            next_due(Some(100.0), reference()),
            reference() + Duration::days(30)
        );
    }

    #[test]
    fn out_of_range_scores_do_not_panic() {
        assert_eq!(
            next_due(Some(-15.0), reference()),
            reference() + Duration::days(3)
        );
        assert_eq!(
            next_due(Some(250.0), reference()),
            reference() + Duration::days(30)
        );
        assert_eq!(
            next_due(Some(f64::INFINITY), reference()),
            reference() + Duration::days(30)
        );
    }

    #[test]
    fn nan_counts_as_absent() {
        assert_eq!(
            next_due(Some(f64::NAN), reference()),
            reference() + Duration::days(1)
        );
    }

    #[test]
    fn scheduling_is_idempotent() {
        let first = next_due(Some(84.2), reference());
        let second = next_due(Some(84.2), reference());
        assert_eq!(first, second);
    }
}

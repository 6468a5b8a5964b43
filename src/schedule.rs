//! Review scheduling for learning modules.
//!
//! Modules move through stages 0 (not started) to 4 (mastered). Stage 0 -> 1
//! happens automatically the first time exercises reach 100%; every later
//! step is a completed review. Stages 1-3 carry a next review date taken
//! from [`INTERVAL_DAYS`].
//!
//! All functions here are total: numeric inputs are clamped, never rejected.

use chrono::{DateTime, Duration, Utc};

use crate::models::{LearningModule, ReviewRecord, ReviewStage};

/// Days until the next review, indexed by the stage being entered.
pub const INTERVAL_DAYS: [i64; 4] = [0, 2, 5, 10];

impl ReviewStage {
    /// Offset for the next review once this stage is entered. `None` for
    /// stages that have nothing scheduled.
    pub fn interval_days(&self) -> Option<i64> {
        if self.is_scheduled() {
            Some(INTERVAL_DAYS[self.as_u8() as usize])
        } else {
            None
        }
    }
}

/// Exercise progress to apply to a module. With both fields set the
/// percentage wins for the completion figure, the delta still moves the count.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProgressUpdate {
    pub delta: Option<i64>,
    pub percentage: Option<f64>,
}

impl ProgressUpdate {
    pub fn delta(delta: i64) -> Self {
        Self {
            delta: Some(delta),
            percentage: None,
        }
    }

    pub fn percentage(percentage: f64) -> Self {
        Self {
            delta: None,
            percentage: Some(percentage),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.delta.is_none() && self.percentage.is_none()
    }
}

fn next_review_after(stage: ReviewStage, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    stage.interval_days().map(|days| now + Duration::days(days))
}

fn derived_percentage(completed: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (completed as f64 / total as f64 * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}

fn clamp_percentage(pct: f64) -> Option<u8> {
    if pct.is_finite() {
        Some(pct.round().clamp(0.0, 100.0) as u8)
    } else {
        None
    }
}

pub fn record_exercise_progress(
    module: &LearningModule,
    update: ProgressUpdate,
    now: DateTime<Utc>,
) -> LearningModule {
    let mut next = module.clone();

    if let Some(delta) = update.delta {
        let total = i64::from(module.exercises_total);
        let completed = i64::from(module.exercises_completed)
            .saturating_add(delta)
            .clamp(0, total);
        next.exercises_completed = completed as u32;
    }

    let override_pct = update.percentage.and_then(clamp_percentage);
    next.completion_percentage = match (override_pct, update.delta) {
        (Some(pct), _) => pct,
        (None, Some(_)) => derived_percentage(next.exercises_completed, next.exercises_total),
        (None, None) => module.completion_percentage.min(100),
    };

    if next.completion_percentage >= 100
        && module.completion_percentage < 100
        && module.review_stage == ReviewStage::NotStarted
    {
        next.review_stage = ReviewStage::First;
        next.next_review_date = next_review_after(ReviewStage::First, now);
        tracing::debug!(module = %module.name, "module completed, first review scheduled");
    }

    next.last_studied = now;
    next
}

pub fn complete_scheduled_review(module: &LearningModule, now: DateTime<Utc>) -> LearningModule {
    let mut next = module.clone();

    next.review_history.push(ReviewRecord {
        date: now,
        stage: module.review_stage,
    });
    next.review_stage = module.review_stage.next();
    next.next_review_date = next_review_after(next.review_stage, now);
    next.last_studied = now;

    tracing::debug!(
        module = %module.name,
        from = module.review_stage.as_u8(),
        to = next.review_stage.as_u8(),
        "review completed"
    );
    next
}

pub fn is_due(module: &LearningModule, now: DateTime<Utc>) -> bool {
    matches!(module.next_review_date, Some(date) if date <= now)
}

/// Whole days a due module is past its review date; zero when not due.
pub fn overdue_days(module: &LearningModule, now: DateTime<Utc>) -> i64 {
    match module.next_review_date {
        Some(date) if date <= now => now.signed_duration_since(date).num_days(),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 1, 12, 0, 0).unwrap()
    }

    fn make_module(completed: u32, total: u32, stage: ReviewStage) -> LearningModule {
        let mut m = LearningModule::new("Physics", "", total, now() - Duration::days(30));
        m.exercises_completed = completed;
        m.completion_percentage = derived_percentage(completed, total);
        m.review_stage = stage;
        m.next_review_date = next_review_after(stage, now() - Duration::days(30));
        m
    }

    mod interval_tests {
        use super::*;

        #[test]
        fn interval_per_stage() {
            assert_eq!(ReviewStage::NotStarted.interval_days(), None);
            assert_eq!(ReviewStage::First.interval_days(), Some(2));
            assert_eq!(ReviewStage::Second.interval_days(), Some(5));
            assert_eq!(ReviewStage::Third.interval_days(), Some(10));
            assert_eq!(ReviewStage::Mastered.interval_days(), None);
        }
    }

    mod progress_tests {
        use super::*;

        #[test]
        fn last_exercise_starts_first_review() {
            let m = make_module(19, 20, ReviewStage::NotStarted);
            let m = record_exercise_progress(&m, ProgressUpdate::delta(1), now());

            assert_eq!(m.exercises_completed, 20);
            assert_eq!(m.completion_percentage, 100);
            assert_eq!(m.review_stage, ReviewStage::First);
            assert_eq!(m.next_review_date, Some(now() + Duration::days(2)));
            assert_eq!(m.last_studied, now());
        }

        #[test]
        fn negative_delta_clamps_at_zero() {
            let m = make_module(5, 10, ReviewStage::NotStarted);
            let m = record_exercise_progress(&m, ProgressUpdate::delta(-10), now());

            assert_eq!(m.exercises_completed, 0);
            assert_eq!(m.completion_percentage, 0);
        }

        #[test]
        fn positive_delta_clamps_at_total() {
            let m = make_module(5, 10, ReviewStage::NotStarted);
            let m = record_exercise_progress(&m, ProgressUpdate::delta(50), now());

            assert_eq!(m.exercises_completed, 10);
            assert_eq!(m.completion_percentage, 100);
        }

        #[test]
        fn extreme_deltas_saturate() {
            let m = make_module(5, 20, ReviewStage::NotStarted);
            let up = record_exercise_progress(&m, ProgressUpdate::delta(i64::MAX), now());
            assert_eq!(up.exercises_completed, 20);
            assert_eq!(up.completion_percentage, 100);
            assert_eq!(up.review_stage, ReviewStage::First);

            let down = record_exercise_progress(&m, ProgressUpdate::delta(i64::MIN), now());
            assert_eq!(down.exercises_completed, 0);
            assert_eq!(down.completion_percentage, 0);
        }

        #[test]
        fn percentage_is_rounded() {
            let m = make_module(0, 3, ReviewStage::NotStarted);
            let m = record_exercise_progress(&m, ProgressUpdate::delta(2), now());
            assert_eq!(m.completion_percentage, 67);
        }

        #[test]
        fn override_takes_precedence_over_delta() {
            let m = make_module(2, 10, ReviewStage::NotStarted);
            let update = ProgressUpdate {
                delta: Some(1),
                percentage: Some(55.0),
            };
            let m = record_exercise_progress(&m, update, now());

            assert_eq!(m.exercises_completed, 3);
            assert_eq!(m.completion_percentage, 55);
        }

        #[test]
        fn override_is_clamped() {
            let m = make_module(0, 10, ReviewStage::NotStarted);
            let m = record_exercise_progress(&m, ProgressUpdate::percentage(250.0), now());
            assert_eq!(m.completion_percentage, 100);
            assert_eq!(m.review_stage, ReviewStage::First);

            let m = make_module(0, 10, ReviewStage::NotStarted);
            let m = record_exercise_progress(&m, ProgressUpdate::percentage(-4.0), now());
            assert_eq!(m.completion_percentage, 0);
        }

        #[test]
        fn non_finite_override_is_ignored() {
            let m = make_module(4, 10, ReviewStage::NotStarted);
            let m = record_exercise_progress(&m, ProgressUpdate::percentage(f64::NAN), now());
            assert_eq!(m.completion_percentage, 40);
        }

        #[test]
        fn empty_update_only_touches_last_studied() {
            let m = make_module(4, 10, ReviewStage::NotStarted);
            let updated = record_exercise_progress(&m, ProgressUpdate::default(), now());

            assert_eq!(updated.exercises_completed, 4);
            assert_eq!(updated.completion_percentage, 40);
            assert_eq!(updated.last_studied, now());
        }

        #[test]
        fn zero_total_yields_zero_percent() {
            let m = make_module(0, 0, ReviewStage::NotStarted);
            let m = record_exercise_progress(&m, ProgressUpdate::delta(3), now());

            assert_eq!(m.exercises_completed, 0);
            assert_eq!(m.completion_percentage, 0);
            assert_eq!(m.review_stage, ReviewStage::NotStarted);
        }

        #[test]
        fn already_complete_does_not_restart() {
            let m = make_module(20, 20, ReviewStage::NotStarted);
            let m = record_exercise_progress(&m, ProgressUpdate::delta(1), now());

            assert_eq!(m.review_stage, ReviewStage::NotStarted);
            assert!(m.next_review_date.is_none());
        }

        #[test]
        fn completion_does_not_reset_existing_schedule() {
            let mut m = make_module(10, 20, ReviewStage::Second);
            m.completion_percentage = 50;
            let before = m.next_review_date;
            let m = record_exercise_progress(&m, ProgressUpdate::percentage(100.0), now());

            assert_eq!(m.review_stage, ReviewStage::Second);
            assert_eq!(m.next_review_date, before);
        }

        #[test]
        fn dropping_below_and_recrossing_keeps_stage() {
            let m = make_module(19, 20, ReviewStage::NotStarted);
            let m = record_exercise_progress(&m, ProgressUpdate::delta(1), now());
            let m = record_exercise_progress(&m, ProgressUpdate::delta(-1), now());
            let later = now() + Duration::days(1);
            let m = record_exercise_progress(&m, ProgressUpdate::delta(1), later);

            assert_eq!(m.review_stage, ReviewStage::First);
            assert_eq!(m.next_review_date, Some(now() + Duration::days(2)));
        }
    }

    mod review_tests {
        use super::*;

        #[test]
        fn first_stage_review_moves_to_second() {
            let m = make_module(20, 20, ReviewStage::First);
            assert!(is_due(&m, now()));

            let m = complete_scheduled_review(&m, now());
            assert_eq!(m.review_stage, ReviewStage::Second);
            assert_eq!(m.next_review_date, Some(now() + Duration::days(5)));
            assert_eq!(
                m.review_history,
                vec![ReviewRecord {
                    date: now(),
                    stage: ReviewStage::First
                }]
            );
        }

        #[test]
        fn second_stage_review_moves_to_third() {
            let m = make_module(20, 20, ReviewStage::Second);
            let m = complete_scheduled_review(&m, now());
            assert_eq!(m.review_stage, ReviewStage::Third);
            assert_eq!(m.next_review_date, Some(now() + Duration::days(10)));
        }

        #[test]
        fn mastery_is_terminal() {
            let m = make_module(20, 20, ReviewStage::Third);

            let m = complete_scheduled_review(&m, now());
            assert_eq!(m.review_stage, ReviewStage::Mastered);
            assert!(m.next_review_date.is_none());
            assert_eq!(m.review_history.len(), 1);

            let m = complete_scheduled_review(&m, now() + Duration::days(1));
            assert_eq!(m.review_stage, ReviewStage::Mastered);
            assert!(m.next_review_date.is_none());
            assert_eq!(m.review_history.len(), 2);
            assert_eq!(m.review_history[1].stage, ReviewStage::Mastered);
        }

        #[test]
        fn review_before_start_enters_first_stage() {
            let m = make_module(3, 20, ReviewStage::NotStarted);
            let m = complete_scheduled_review(&m, now());
            assert_eq!(m.review_stage, ReviewStage::First);
            assert_eq!(m.next_review_date, Some(now() + Duration::days(2)));
            assert_eq!(m.review_history[0].stage, ReviewStage::NotStarted);
        }

        #[test]
        fn review_does_not_check_due_date() {
            let mut m = make_module(20, 20, ReviewStage::First);
            m.next_review_date = Some(now() + Duration::days(1));
            assert!(!is_due(&m, now()));

            let m = complete_scheduled_review(&m, now());
            assert_eq!(m.review_stage, ReviewStage::Second);
        }
    }

    mod due_tests {
        use super::*;

        #[test]
        fn unscheduled_is_never_due() {
            let m = make_module(0, 10, ReviewStage::NotStarted);
            assert!(!is_due(&m, now()));
            assert_eq!(overdue_days(&m, now()), 0);
        }

        #[test]
        fn due_exactly_at_review_date() {
            let mut m = make_module(10, 10, ReviewStage::First);
            m.next_review_date = Some(now());
            assert!(is_due(&m, now()));
            assert!(!is_due(&m, now() - Duration::seconds(1)));
        }

        #[test]
        fn overdue_counts_whole_days() {
            let mut m = make_module(10, 10, ReviewStage::First);
            m.next_review_date = Some(now() - Duration::hours(50));
            assert_eq!(overdue_days(&m, now()), 2);
        }
    }

    fn stage_strategy() -> impl Strategy<Value = ReviewStage> {
        (0u8..=4).prop_map(ReviewStage::from_u8)
    }

    proptest! {
        #[test]
        fn progress_keeps_counts_in_bounds(
            total in 0u32..200,
            completed_seed in 0u32..200,
            delta in proptest::option::of(any::<i64>()),
            pct in proptest::option::of(-1000.0f64..1000.0),
            stage in stage_strategy(),
        ) {
            let completed = completed_seed.min(total);
            let m = make_module(completed, total, stage);
            let update = ProgressUpdate { delta, percentage: pct };
            let next = record_exercise_progress(&m, update, now());

            prop_assert!(next.exercises_completed <= next.exercises_total);
            prop_assert!(next.completion_percentage <= 100);
            prop_assert!(next.review_stage >= m.review_stage);
            prop_assert!(next.is_consistent());
        }

        #[test]
        fn reviews_are_monotonic(stage in stage_strategy(), calls in 1usize..8) {
            let mut m = make_module(10, 10, stage);
            for i in 0..calls {
                let before = m.clone();
                m = complete_scheduled_review(&m, now() + Duration::days(i as i64));
                prop_assert!(m.review_stage >= before.review_stage);
                prop_assert_eq!(m.review_history.len(), before.review_history.len() + 1);
                prop_assert!(m.is_consistent());
                if m.review_stage == ReviewStage::Mastered {
                    prop_assert!(m.next_review_date.is_none());
                }
            }
        }
    }
}

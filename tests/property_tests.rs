//! Property-based tests for invariants using proptest
//!
//! - Threshold classification at and around the boundaries
//! - The worst status always wins an aggregate
//! - Report chunks reassemble into the original text
//! - Budget admission is strict

use std::sync::Arc;

use chrono::NaiveDate;
use infra_monitoring::{
    aggregator::aggregate,
    budget::{BudgetState, BudgetTracker, MemoryBudgetStore, PriceTable},
    metrics::CollectorResult,
    report::{RenderedReport, split_lines},
    status::{HealthStatus, Threshold},
};
use proptest::prelude::*;

fn any_status() -> impl Strategy<Value = HealthStatus> {
    prop_oneof![
        Just(HealthStatus::Green),
        Just(HealthStatus::Yellow),
        Just(HealthStatus::Red),
        Just(HealthStatus::Unknown),
    ]
}

fn report_line() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z ]{0,30}",
        "[🟢🔴⚪✅ a-z]{0,12}",
        "[a-z]{40,90}",
    ]
}

proptest! {
    #[test]
    fn prop_value_on_red_threshold_is_red(yellow in 0.0f64..80.0, gap in 0.1f64..20.0) {
        let red = yellow + gap;
        prop_assert_eq!(Threshold::higher_is_worse(yellow, red).classify(red), HealthStatus::Red);
        prop_assert_eq!(Threshold::higher_is_worse(yellow, red).classify(yellow), HealthStatus::Yellow);

        // free space: red sits below yellow
        prop_assert_eq!(Threshold::lower_is_worse(red, yellow).classify(yellow), HealthStatus::Red);
        prop_assert_eq!(Threshold::lower_is_worse(red, yellow).classify(red), HealthStatus::Yellow);
    }
}

proptest! {
    #[test]
    fn prop_classification_is_monotonic(
        yellow in 0.0f64..80.0,
        gap in 0.1f64..20.0,
        a in 0.0f64..100.0,
        b in 0.0f64..100.0,
    ) {
        let threshold = Threshold::higher_is_worse(yellow, yellow + gap);
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(threshold.classify(low) <= threshold.classify(high));
    }
}

proptest! {
    #[test]
    fn prop_overall_is_worst_result(statuses in prop::collection::vec(any_status(), 1..40)) {
        let results: Vec<_> = statuses
            .iter()
            .enumerate()
            .map(|(i, status)| CollectorResult::new("http", format!("t{i}"), *status, "msg"))
            .collect();

        let agg = aggregate(&results);
        let expected = statuses.iter().copied().max().unwrap();
        prop_assert_eq!(agg.overall, expected);
        prop_assert_eq!(agg.issues.len(), statuses.iter().filter(|s| s.is_issue()).count());
        prop_assert_eq!(agg.passed + agg.issues.len(), agg.total);

        if statuses.contains(&HealthStatus::Red) {
            prop_assert_eq!(agg.overall, HealthStatus::Red);
        }
    }
}

proptest! {
    #[test]
    fn prop_split_lines_reassembles(
        lines in prop::collection::vec(report_line(), 0..60),
        max in 10usize..120,
    ) {
        let text = lines.join("\n");
        let chunks = split_lines(&text, max);

        prop_assert_eq!(chunks.concat(), text);
        for chunk in &chunks {
            prop_assert!(!chunk.is_empty());
            prop_assert!(chunk.chars().count() <= max);
        }
    }
}

proptest! {
    #[test]
    fn prop_short_lines_break_only_after_newlines(
        lines in prop::collection::vec("[a-z ]{0,30}", 1..60),
        max in 40usize..200,
    ) {
        let text = lines.join("\n");
        let chunks = split_lines(&text, max);

        for chunk in &chunks[..chunks.len().saturating_sub(1)] {
            prop_assert!(chunk.ends_with('\n'));
        }
    }
}

proptest! {
    #[test]
    fn prop_report_chunks_keep_header_first(
        body in prop::collection::vec(report_line(), 1..40),
        max in 60usize..400,
    ) {
        let report = RenderedReport {
            sections: vec![
                "🔴 *Infrastructure Health Report*\n📊 *Overall Status*: Critical Issues".to_string(),
                body.join("\n"),
            ],
        };

        let chunks = report.chunks(max);
        prop_assert_eq!(chunks.concat(), report.text());
        prop_assert!(chunks[0].starts_with("🔴 *Infrastructure Health Report*"));
        for chunk in &chunks {
            prop_assert!(chunk.chars().count() <= max);
        }
    }
}

proptest! {
    #[test]
    fn prop_can_afford_is_strict(spent_cents in 0u32..300, estimate_cents in 0u32..300) {
        let spent = f64::from(spent_cents) / 100.0;
        let estimate = f64::from(estimate_cents) / 100.0;
        let today = NaiveDate::from_ymd_opt(2025, 2, 14).unwrap();

        let store = Arc::new(MemoryBudgetStore::with_state(BudgetState {
            date: today,
            spent,
            daily_limit: 3.0,
        }));
        let tracker = BudgetTracker::new(store, 3.0, PriceTable::default())
            .with_clock(move || today);

        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let affordable = runtime.block_on(tracker.can_afford(estimate));

        prop_assert_eq!(affordable, spent + estimate < 3.0);
    }
}

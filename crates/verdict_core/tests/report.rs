use chrono::{Duration, TimeZone, Utc};
use verdict_core::{
    format_seconds, ItemFilter, ItemStatus, Label, MemoryStorage, Outcome, RunReport, RunState,
    SourceItem, WorkItemStore,
};

/// Items: 0 correct, 1 incorrect, 2 failed, 3 unlabelled success, 4 pending.
fn finished_state() -> RunState {
    let (mut store, _) = WorkItemStore::open(Box::new(MemoryStorage::new())).unwrap();
    store
        .seed(vec![
            SourceItem::new("https://a", 2, "截图链接").with_expected(Label::Qualified),
            SourceItem::new("https://b", 3, "截图链接").with_expected(Label::Unqualified),
            SourceItem::new("https://c", 4, "截图链接").with_expected(Label::Qualified),
            SourceItem::new("https://d", 5, "截图链接"),
            SourceItem::new("https://e", 6, "截图链接"),
        ])
        .unwrap();
    let start = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
    store.begin_run(0, start).unwrap();
    for (index, derived) in [(0, Label::Qualified), (1, Label::Qualified), (3, Label::Qualified)] {
        store.mark_in_flight(index).unwrap();
        store
            .mark_succeeded(index, Outcome::Text("合格".into()), derived)
            .unwrap();
    }
    store.mark_in_flight(2).unwrap();
    store.mark_failed(2, "http status 500: boom").unwrap();
    store.finish_run(start + Duration::seconds(9)).unwrap();
    store.snapshot()
}

#[test]
fn counts_and_progress() {
    let report = RunReport::from_state(&finished_state());
    assert_eq!(report.counts.total, 5);
    assert_eq!(report.counts.succeeded, 3);
    assert_eq!(report.counts.failed, 1);
    assert_eq!(report.counts.pending, 1);
    assert_eq!(report.counts.in_flight, 0);
    assert!((report.counts.progress() - 0.8).abs() < f64::EPSILON);
}

#[test]
fn accuracy_counts_only_labelled_successes() {
    let report = RunReport::from_state(&finished_state());
    assert_eq!(report.accuracy.labelled, 2);
    assert_eq!(report.accuracy.correct, 1);
    assert_eq!(report.accuracy.incorrect, 1);
    assert_eq!(report.accuracy.display_percentage(), "50.00%");
}

#[test]
fn accuracy_without_labels_is_zero() {
    let report = RunReport::from_state(&RunState::default());
    assert_eq!(report.accuracy.percentage(), None);
    assert_eq!(report.accuracy.display_percentage(), "0.00%");
    assert_eq!(report.counts.progress(), 0.0);
}

#[test]
fn timing_average_is_per_success() {
    let report = RunReport::from_state(&finished_state());
    assert_eq!(report.timing.elapsed, Some(Duration::seconds(9)));
    assert_eq!(report.timing.average_per_success, Some(Duration::seconds(3)));
    assert_eq!(format_seconds(Duration::milliseconds(1234)), "1.23s");
}

#[test]
fn filters_select_by_status_and_judgement() {
    let state = finished_state();
    let indices = |filter: ItemFilter| -> Vec<usize> {
        filter.apply(&state).into_iter().map(|(index, _)| index).collect()
    };
    assert_eq!(indices(ItemFilter::All), vec![0, 1, 2, 3, 4]);
    assert_eq!(indices(ItemFilter::Status(ItemStatus::Succeeded)), vec![0, 1, 3]);
    assert_eq!(indices(ItemFilter::Status(ItemStatus::Failed)), vec![2]);
    assert_eq!(indices(ItemFilter::Correct), vec![0]);
    assert_eq!(indices(ItemFilter::Incorrect), vec![1]);
}

#[test]
fn filter_names_parse() {
    assert_eq!("pending".parse::<ItemFilter>(), Ok(ItemFilter::Status(ItemStatus::Pending)));
    assert_eq!("In-Flight".parse::<ItemFilter>(), Ok(ItemFilter::Status(ItemStatus::InFlight)));
    assert_eq!("correct".parse::<ItemFilter>(), Ok(ItemFilter::Correct));
    assert!("bogus".parse::<ItemFilter>().is_err());
}

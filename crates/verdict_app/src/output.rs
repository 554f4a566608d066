use verdict_core::{
    format_seconds, ItemFilter, ItemState, RunReport, RunState, StatusCounts, WorkItem,
};

pub(crate) fn print_summary(state: &RunState) {
    let report = RunReport::from_state(state);
    let counts = report.counts;
    println!("Phase:     {:?}", state.phase());
    println!(
        "Items:     {} total, {} succeeded, {} failed, {} pending",
        counts.total, counts.succeeded, counts.failed, counts.pending
    );
    if counts.in_flight > 0 {
        println!("In flight: {}", counts.in_flight);
    }
    println!("Progress:  {}", progress_line(&counts));
    println!(
        "Accuracy:  {} ({} correct, {} incorrect of {} labelled)",
        report.accuracy.display_percentage(),
        report.accuracy.correct,
        report.accuracy.incorrect,
        report.accuracy.labelled
    );
    if let Some(elapsed) = report.timing.elapsed {
        println!("Elapsed:   {}", format_seconds(elapsed));
    }
    if let Some(average) = report.timing.average_per_success {
        println!("Average:   {} per succeeded item", format_seconds(average));
    }
}

pub(crate) fn print_items(state: &RunState, filter: ItemFilter) {
    let items = filter.apply(state);
    if items.is_empty() {
        println!("No matching items.");
        return;
    }
    for (index, item) in items {
        println!("{}", item_line(index, item));
    }
}

pub(crate) fn progress_line(counts: &StatusCounts) -> String {
    format!(
        "{}/{} ({:.1}%)",
        counts.finished(),
        counts.total,
        counts.progress() * 100.0
    )
}

fn item_line(index: usize, item: &WorkItem) -> String {
    let detail = match item.state() {
        ItemState::Succeeded { outcome } => {
            let judgement = match outcome.matches_expected {
                Some(true) => " [correct]",
                Some(false) => " [incorrect]",
                None => "",
            };
            format!("{}{}", single_line(&outcome.result.verdict_text()), judgement)
        }
        ItemState::Failed { reason } => single_line(reason),
        ItemState::Pending | ItemState::InFlight => String::new(),
    };
    format!(
        "{:>5}  row {:<5} {:<10} {}  {}",
        index,
        item.source_row,
        item.status().to_string(),
        item.url,
        detail
    )
    .trim_end()
    .to_string()
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use verdict_core::SourceItem;

    #[test]
    fn pending_item_line_has_no_detail() {
        let item = WorkItem::from(SourceItem::new("https://a/1.png", 7, "截图链接"));
        assert_eq!(
            item_line(3, &item),
            "    3  row 7     pending    https://a/1.png"
        );
    }

    #[test]
    fn progress_counts_finished_items() {
        let counts = StatusCounts {
            total: 4,
            pending: 1,
            in_flight: 0,
            succeeded: 2,
            failed: 1,
        };
        assert_eq!(progress_line(&counts), "3/4 (75.0%)");
    }

    #[test]
    fn single_line_collapses_whitespace() {
        assert_eq!(single_line("不合格\n 模糊  截图"), "不合格 模糊 截图");
    }
}

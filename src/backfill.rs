//! Whole-board runs of one automation under a wall-clock budget.
//!
//! A run stops before its budget is spent and hands back a cursor naming the
//! page it was on and how many of that page's items it already handled, as
//! `<page>#<n>`. A resumed run skips those `n` items, so every pass makes
//! progress even when a single page costs more than the budget.

use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::automations::{Automation, RunMode, Runner, Trigger};
use crate::config::BackfillConfig;
use crate::sync::Outcome;

/// Resumption cursor meaning "from the first page".
pub const START_CURSOR: &str = "start";

const OFFSET_SEPARATOR: char = '#';

#[derive(Debug, Clone, Copy)]
pub struct BackfillOptions {
    pub time_budget: Duration,
    pub page_size: u32,
    pub write_delay: Duration,
    pub mode: RunMode,
}

impl BackfillOptions {
    pub fn from_config(config: &BackfillConfig, mode: RunMode) -> Self {
        Self {
            time_budget: Duration::from_secs(config.time_budget_secs),
            page_size: config.page_size.max(1),
            write_delay: Duration::from_millis(config.write_delay_ms),
            mode,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedChange {
    pub item_id: u64,
    pub name: String,
    pub changes: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemFailure {
    /// `None` when a page fetch failed rather than a single item.
    pub item_id: Option<u64>,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackfillReport {
    pub automation: String,
    pub dry_run: bool,
    pub processed: usize,
    pub written: usize,
    pub skipped: usize,
    pub planned: Vec<PlannedChange>,
    pub failures: Vec<ItemFailure>,
    /// Pass back to continue; `None` once the board is finished.
    pub cursor: Option<String>,
    pub complete: bool,
    pub elapsed_ms: u64,
}

fn resume_token(page_cursor: &Option<String>, offset: usize) -> String {
    let page = page_cursor.as_deref().unwrap_or(START_CURSOR);
    if offset == 0 {
        page.to_string()
    } else {
        format!("{page}{OFFSET_SEPARATOR}{offset}")
    }
}

/// Split a resume token into the page cursor (`None` for the first page) and
/// the number of items of that page to skip.
fn parse_resume(resume: Option<&str>) -> (Option<String>, usize) {
    let Some(token) = resume.map(str::trim).filter(|c| !c.is_empty()) else {
        return (None, 0);
    };
    let (page, offset) = match token.rsplit_once(OFFSET_SEPARATOR) {
        Some((page, n)) => match n.parse() {
            Ok(n) => (page, n),
            Err(_) => (token, 0),
        },
        None => (token, 0),
    };
    let page = (page != START_CURSOR && !page.is_empty()).then(|| page.to_string());
    (page, offset)
}

pub async fn run_backfill(
    runner: &Runner,
    automation: &dyn Automation,
    resume: Option<&str>,
    options: BackfillOptions,
) -> BackfillReport {
    let started = Instant::now();
    let mut report = BackfillReport {
        automation: automation.name().to_string(),
        dry_run: options.mode == RunMode::DryRun,
        processed: 0,
        written: 0,
        skipped: 0,
        planned: Vec::new(),
        failures: Vec::new(),
        cursor: None,
        complete: false,
        elapsed_ms: 0,
    };

    let (mut page_cursor, mut skip) = parse_resume(resume);

    'pages: loop {
        if started.elapsed() >= options.time_budget {
            report.cursor = Some(resume_token(&page_cursor, skip));
            break;
        }

        let page = match runner
            .api()
            .fetch_items_page(automation.board_id(), page_cursor.as_deref(), options.page_size)
            .await
        {
            Ok(page) => page,
            Err(e) => {
                warn!(automation = automation.name(), error = %e, "page fetch failed");
                report.failures.push(ItemFailure {
                    item_id: None,
                    error: e.to_string(),
                });
                report.cursor = Some(resume_token(&page_cursor, skip));
                break;
            }
        };

        for (index, item) in page.items.iter().enumerate().skip(skip) {
            if started.elapsed() >= options.time_budget {
                report.cursor = Some(resume_token(&page_cursor, index));
                break 'pages;
            }
            report.processed += 1;

            match runner
                .run(automation, item, &Trigger::backfill(), options.mode)
                .await
            {
                Ok(run) => match run.outcome {
                    Outcome::WritePerformed => {
                        report.written += 1;
                        tokio::time::sleep(options.write_delay).await;
                    }
                    Outcome::WouldWrite => report.planned.push(PlannedChange {
                        item_id: item.id,
                        name: item.name.clone(),
                        changes: run.changes,
                    }),
                    Outcome::NotNeeded | Outcome::LoopRisk => report.skipped += 1,
                },
                Err(e) => {
                    warn!(automation = automation.name(), item_id = item.id, error = %e, "item failed");
                    report.failures.push(ItemFailure {
                        item_id: Some(item.id),
                        error: e.to_string(),
                    });
                }
            }
        }

        skip = 0;
        match page.cursor {
            Some(next) => page_cursor = Some(next),
            None => {
                report.complete = true;
                break;
            }
        }
    }

    report.elapsed_ms = started.elapsed().as_millis() as u64;
    info!(
        automation = %report.automation,
        processed = report.processed,
        written = report.written,
        failures = report.failures.len(),
        complete = report.complete,
        "backfill pass finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::{date_column, make_item, page_cursor, InMemoryBoard};
    use crate::api::{ApiError, BoardApi};
    use crate::automations::crew_link::CrewLink;
    use crate::automations::date_copy::DateCopy;
    use crate::config::{CrewLinkConfig, DateCopyConfig};
    use crate::model::item::{Item, ItemsPage, RawColumnValue};
    use crate::sync::derive::ShiftDirection;
    use std::sync::Arc;

    fn automation() -> DateCopy {
        DateCopy::new(DateCopyConfig {
            name: "load-in".into(),
            board_id: 1,
            source_column: "date".into(),
            status_column: "status".into(),
            target_column: "date4".into(),
            exempt_label: "Rehearsal".into(),
            direction: ShiftDirection::Backward,
            marker_column: None,
            trigger_columns: None,
        })
    }

    fn board(count: u64) -> Arc<InMemoryBoard> {
        let items = (1..=count)
            .map(|i| make_item(i, &format!("Gig {i}"), vec![date_column("date", "2025-03-29")]))
            .collect();
        Arc::new(InMemoryBoard::new(1, items))
    }

    fn options(budget_ms: u64, page_size: u32, mode: RunMode) -> BackfillOptions {
        BackfillOptions {
            time_budget: Duration::from_millis(budget_ms),
            page_size,
            write_delay: Duration::from_millis(100),
            mode,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn finishes_small_board_in_one_pass() {
        let board = board(3);
        let runner = Runner::new(board.clone(), None);
        let report = run_backfill(&runner, &automation(), None, options(10_000, 2, RunMode::Execute)).await;
        assert!(report.complete);
        assert_eq!(report.cursor, None);
        assert_eq!(report.processed, 3);
        assert_eq!(report.written, 3);
        assert_eq!(board.writes().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn resumes_at_page_boundary_without_overlap() {
        let board = board(5);
        let runner = Runner::new(board.clone(), None);
        let opts = options(350, 2, RunMode::Execute);

        let first = run_backfill(&runner, &automation(), None, opts).await;
        assert!(!first.complete);
        assert_eq!(first.cursor, Some(page_cursor(4)));
        assert_eq!(first.written, 4);

        let second = run_backfill(&runner, &automation(), first.cursor.as_deref(), opts).await;
        assert!(second.complete);
        assert_eq!(second.cursor, None);
        assert_eq!(second.processed, 1);

        let written: Vec<u64> = board.writes().iter().map(|(id, _)| *id).collect();
        assert_eq!(written, [1, 2, 3, 4, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn mid_page_stop_resumes_after_handled_items() {
        let board = board(5);
        let runner = Runner::new(board.clone(), None);
        let opts = options(150, 10, RunMode::Execute);

        let mut cursor: Option<String> = None;
        let mut cursors = Vec::new();
        let mut processed = 0;
        loop {
            let report = run_backfill(&runner, &automation(), cursor.as_deref(), opts).await;
            assert!(report.failures.is_empty());
            processed += report.processed;
            if report.complete {
                break;
            }
            cursors.push(report.cursor.clone().unwrap());
            cursor = report.cursor;
            assert!(cursors.len() < 10, "backfill never completed");
        }

        assert_eq!(cursors, ["start#2", "start#4"]);
        assert_eq!(processed, 5, "no item visited twice");
        let written: Vec<u64> = board.writes().iter().map(|(id, _)| *id).collect();
        assert_eq!(written, [1, 2, 3, 4, 5]);
    }

    /// Board whose single-item reads are slow, like a remote API under load.
    struct SlowReads {
        inner: InMemoryBoard,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl BoardApi for SlowReads {
        async fn fetch_item(&self, item_id: u64) -> Result<Option<Item>, ApiError> {
            tokio::time::sleep(self.delay).await;
            self.inner.fetch_item(item_id).await
        }

        async fn fetch_items_page(
            &self,
            board_id: u64,
            cursor: Option<&str>,
            limit: u32,
        ) -> Result<ItemsPage, ApiError> {
            self.inner.fetch_items_page(board_id, cursor, limit).await
        }

        async fn change_column_values(
            &self,
            board_id: u64,
            item_id: u64,
            values: &Map<String, Value>,
        ) -> Result<(), ApiError> {
            self.inner.change_column_values(board_id, item_id, values).await
        }
    }

    fn crew_item(id: u64, job: u64) -> Item {
        let linked = serde_json::json!({ "linkedPulseIds": [{ "linkedPulseId": job }] });
        make_item(
            id,
            "Van run",
            vec![RawColumnValue::new("connect_boards", Some("Job"), Some(&linked.to_string()))],
        )
    }

    #[tokio::test(start_paused = true)]
    async fn page_slower_than_budget_still_completes() {
        let mut items: Vec<Item> = (1..=10).map(|id| crew_item(id, 500)).collect();
        let url = "https://hire.example/job.php?id=13422";
        items.push(make_item(
            500,
            "Job",
            vec![RawColumnValue::new(
                "link",
                Some(&format!("Job sheet - {url}")),
                Some(&serde_json::json!({ "url": url, "text": "Job sheet" }).to_string()),
            )],
        ));
        let api = Arc::new(SlowReads {
            inner: InMemoryBoard::new(1, items),
            delay: Duration::from_millis(100),
        });
        let runner = Runner::new(api, None);
        let crew = CrewLink::new(CrewLinkConfig {
            name: "crew".into(),
            board_id: 1,
            relation_column: "connect_boards".into(),
            job_url_column: "link".into(),
            target_column: "text_job".into(),
            link_column: None,
            marker_column: None,
        });
        let opts = options(450, 50, RunMode::DryRun);

        let mut cursor: Option<String> = None;
        let mut planned = Vec::new();
        for _ in 0..6 {
            let report = run_backfill(&runner, &crew, cursor.as_deref(), opts).await;
            planned.extend(report.planned.iter().map(|p| p.item_id));
            if report.complete {
                assert_eq!(planned, (1..=10).collect::<Vec<u64>>());
                return;
            }
            cursor = report.cursor;
        }
        panic!("backfill never completed, last cursor {cursor:?}");
    }

    #[test]
    fn resume_tokens_round_trip_page_and_offset() {
        assert_eq!(parse_resume(None), (None, 0));
        assert_eq!(parse_resume(Some(START_CURSOR)), (None, 0));
        assert_eq!(parse_resume(Some("start#3")), (None, 3));
        assert_eq!(parse_resume(Some("page-4#1")), (Some("page-4".into()), 1));
        assert_eq!(parse_resume(Some("abc#xyz")), (Some("abc#xyz".into()), 0));
        assert_eq!(resume_token(&None, 0), START_CURSOR);
        assert_eq!(resume_token(&Some("page-4".into()), 2), "page-4#2");
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_returns_cursor() {
        let board = board(3);
        let runner = Runner::new(board.clone(), None);
        let report = run_backfill(&runner, &automation(), Some(START_CURSOR), options(0, 2, RunMode::Execute)).await;
        assert_eq!(report.processed, 0);
        assert_eq!(report.cursor.as_deref(), Some(START_CURSOR));
        assert!(!report.complete);
    }

    #[tokio::test(start_paused = true)]
    async fn dry_run_plans_without_writing() {
        let board = board(2);
        let runner = Runner::new(board.clone(), None);
        let report = run_backfill(&runner, &automation(), None, options(10_000, 10, RunMode::DryRun)).await;
        assert!(report.dry_run);
        assert!(report.complete);
        assert_eq!(report.planned.len(), 2);
        assert_eq!(report.planned[0].changes["date4"], serde_json::json!({"date": "2025-03-28"}));
        assert!(board.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn item_errors_are_collected() {
        let board = Arc::new(
            InMemoryBoard::new(
                1,
                vec![
                    make_item(1, "ok", vec![date_column("date", "2025-03-29")]),
                    make_item(2, "bad date", vec![RawColumnValue::new("date", Some("TBC"), None)]),
                    make_item(3, "write fails", vec![date_column("date", "2025-03-29")]),
                    make_item(4, "no date", vec![]),
                ],
            )
            .with_write_failure(3),
        );
        let runner = Runner::new(board.clone(), None);
        let report = run_backfill(&runner, &automation(), None, options(10_000, 10, RunMode::Execute)).await;
        assert!(report.complete);
        assert_eq!(report.processed, 4);
        assert_eq!(report.written, 1);
        assert_eq!(report.skipped, 1);
        let failed: Vec<_> = report.failures.iter().map(|f| f.item_id).collect();
        assert_eq!(failed, [Some(2), Some(3)]);
    }

    #[tokio::test(start_paused = true)]
    async fn bad_cursor_reports_page_failure() {
        let board = board(3);
        let runner = Runner::new(board.clone(), None);
        let report = run_backfill(&runner, &automation(), Some("bogus"), options(10_000, 2, RunMode::Execute)).await;
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].item_id, None);
        assert_eq!(report.cursor.as_deref(), Some("bogus"));
        assert!(!report.complete);
    }
}

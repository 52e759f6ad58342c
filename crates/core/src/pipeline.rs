//! The forwarding pipeline.
//!
//! One run moves through `Init -> SchemaReady -> Fetched`, then visits every fetched work item
//! in order: `Checked -> Built -> Sent -> Recorded`. Items are processed strictly one after
//! another; nothing about item N+1 starts before item N is finished.
//!
//! ## Failure handling
//!
//! - A retention window reaching before the earliest representable instant, schema, fetch and
//!   dedup-check failures end the run with a [`PipelineError`]. A failed
//!   dedup check means the pipeline cannot tell whether an order was already forwarded, so it
//!   stops rather than risk a duplicate.
//! - Build and dispatch failures are logged and the item is skipped; nothing is recorded, so a
//!   later run will try again.
//! - A ledger write failing *after* a successful send is logged at error level and counted as
//!   unrecorded. The order went out but a later run may send it again.

use crate::builder::MessageBuilder;
use crate::config::WorklistFilter;
use crate::dedup::DedupStore;
use crate::dispatch::Dispatcher;
use crate::error::{BuildError, ConfigError, PipelineResult};
use crate::fetch::CandidateFetcher;
use chrono::{DateTime, Utc};
use dicom_wire::WorkItem;
use std::fmt;

/// Where a skipped item failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailedStage {
    Build,
    Dispatch,
}

/// The result of processing one work item.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Already sent within the retention window.
    Skipped,
    /// Sent and recorded.
    Sent,
    /// Not sent.
    Failed(FailedStage),
    /// Sent, but the ledger write failed.
    Unrecorded,
}

/// Counts for one run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Every work item the fetcher returned.
    pub processed: usize,
    pub sent: usize,
    pub skipped: usize,
    /// Items that never became a message.
    pub build_failed: usize,
    /// Messages the order-management service did not accept.
    pub dispatch_failed: usize,
    pub unrecorded: usize,
}

impl RunReport {
    /// Items not sent in this run because of a failure at any stage.
    pub fn failed(&self) -> usize {
        self.build_failed + self.dispatch_failed
    }

    fn tally(&mut self, outcome: ItemOutcome) {
        self.processed += 1;
        match outcome {
            ItemOutcome::Skipped => self.skipped += 1,
            ItemOutcome::Sent => self.sent += 1,
            ItemOutcome::Failed(FailedStage::Build) => self.build_failed += 1,
            ItemOutcome::Failed(FailedStage::Dispatch) => self.dispatch_failed += 1,
            ItemOutcome::Unrecorded => self.unrecorded += 1,
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Processed {} worklist items ({} sent, {} skipped, {} failed [{} build, {} dispatch], {} unrecorded)",
            self.processed,
            self.sent,
            self.skipped,
            self.failed(),
            self.build_failed,
            self.dispatch_failed,
            self.unrecorded
        )
    }
}

/// Fetch, dedup, build, dispatch and record, once per run.
pub struct Pipeline<S, F, D> {
    store: S,
    fetcher: F,
    dispatcher: D,
    retention_window: chrono::Duration,
}

impl<S, F, D> Pipeline<S, F, D>
where
    S: DedupStore,
    F: CandidateFetcher,
    D: Dispatcher,
{
    pub fn new(store: S, fetcher: F, dispatcher: D, retention_window: chrono::Duration) -> Self {
        Self {
            store,
            fetcher,
            dispatcher,
            retention_window,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    /// Run the pipeline once for `filter`, as of the current time.
    pub async fn run(&self, filter: &WorklistFilter) -> PipelineResult<RunReport> {
        self.run_at(filter, Utc::now()).await
    }

    /// Run the pipeline once for `filter`, as of `now`.
    ///
    /// `now` anchors the retention window for every item and is the timestamp recorded for
    /// every send in this run.
    pub async fn run_at(
        &self,
        filter: &WorklistFilter,
        now: DateTime<Utc>,
    ) -> PipelineResult<RunReport> {
        let window_start = now
            .checked_sub_signed(self.retention_window)
            .ok_or_else(|| {
                ConfigError::InvalidInput(format!(
                    "retention window of {} days reaches before the earliest representable time",
                    self.retention_window.num_days()
                ))
            })?;

        self.store.ensure_schema()?;

        let items = self.fetcher.fetch(filter).await?;
        tracing::info!("fetched {} candidate work items", items.len());

        let mut report = RunReport::default();
        for item in items {
            let outcome = self.process_item(item, window_start, now).await?;
            report.tally(outcome);
        }

        tracing::info!("{}", report);
        Ok(report)
    }

    async fn process_item(
        &self,
        item: WorkItem,
        window_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> PipelineResult<ItemOutcome> {
        let Some(accession) = item.accession_number().cloned() else {
            tracing::warn!(
                "skipping work item: {} (patient id: {})",
                BuildError::MissingAccessionNumber,
                item.patient_id().unwrap_or("<none>")
            );
            return Ok(ItemOutcome::Failed(FailedStage::Build));
        };

        if self.store.was_sent_recently(&accession, window_start)? {
            tracing::debug!("{}: sent since {}, skipping", accession, window_start);
            return Ok(ItemOutcome::Skipped);
        }
        tracing::debug!("{}: checked, not sent since {}", accession, window_start);

        let message = match MessageBuilder::build(&item) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("{}: build failed, skipping: {}", accession, e);
                return Ok(ItemOutcome::Failed(FailedStage::Build));
            }
        };
        tracing::debug!(
            "{}: built message with instance {} (procedure step: {})",
            accession,
            message.sop_instance_uid,
            item.procedure_id().unwrap_or("<none>")
        );

        if let Err(e) = self.dispatcher.send(&message).await {
            tracing::warn!("{}: dispatch failed, will retry next run: {}", accession, e);
            return Ok(ItemOutcome::Failed(FailedStage::Dispatch));
        }

        match self.store.record_sent(&accession, now) {
            Ok(()) => {
                tracing::debug!("{}: recorded", accession);
                Ok(ItemOutcome::Sent)
            }
            Err(e) => {
                tracing::error!(
                    "{}: SENT BUT NOT RECORDED, a later run may send it again: {}",
                    accession,
                    e
                );
                Ok(ItemOutcome::Unrecorded)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::SqliteDedupStore;
    use crate::error::{
        DispatchError, DispatchResult, FetchError, FetchResult, PipelineError, StorageError,
        StorageResult,
    };
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use crate::testing::identifier;
    use dicom_wire::OutboundMessage;
    use orm_types::AccessionNumber;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct FixedFetcher {
        items: Vec<WorkItem>,
        fail: bool,
    }

    #[async_trait]
    impl CandidateFetcher for FixedFetcher {
        async fn fetch(&self, _filter: &WorklistFilter) -> FetchResult<Vec<WorkItem>> {
            if self.fail {
                return Err(FetchError::Rejected { status: 0xC000 });
            }
            Ok(self.items.clone())
        }
    }

    #[derive(Default)]
    struct RecordingDispatcher {
        sent: Mutex<Vec<OutboundMessage>>,
        reject: HashSet<String>,
    }

    impl RecordingDispatcher {
        fn rejecting(accessions: &[&str]) -> Self {
            Self {
                reject: accessions.iter().map(|a| a.to_string()).collect(),
                ..Self::default()
            }
        }

        fn sent_accessions(&self) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|m| m.accession_number.to_string())
                .collect()
        }
    }

    #[async_trait]
    impl Dispatcher for RecordingDispatcher {
        async fn send(&self, message: &OutboundMessage) -> DispatchResult<()> {
            if self.reject.contains(message.accession_number.as_str()) {
                return Err(DispatchError::Rejected { status: 0xA700 });
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    /// Ledger whose reads or writes can be made to fail.
    struct FlakyStore {
        inner: SqliteDedupStore,
        fail_check: bool,
        fail_record: bool,
    }

    impl DedupStore for FlakyStore {
        fn ensure_schema(&self) -> StorageResult<()> {
            self.inner.ensure_schema()
        }

        fn was_sent_recently(
            &self,
            accession: &AccessionNumber,
            window_start: DateTime<Utc>,
        ) -> StorageResult<bool> {
            if self.fail_check {
                return Err(StorageError::Query(rusqlite::Error::InvalidQuery));
            }
            self.inner.was_sent_recently(accession, window_start)
        }

        fn record_sent(
            &self,
            accession: &AccessionNumber,
            sent_at: DateTime<Utc>,
        ) -> StorageResult<()> {
            if self.fail_record {
                return Err(StorageError::Write(rusqlite::Error::InvalidQuery));
            }
            self.inner.record_sent(accession, sent_at)
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 30, 0).unwrap()
    }

    fn filter() -> WorklistFilter {
        WorklistFilter::new("20250601", "CT", "CT1").unwrap()
    }

    fn item(accession: Option<&str>) -> WorkItem {
        let patient_id = accession.map(|a| format!("PID-{a}"));
        WorkItem::from_identifier(&identifier(
            accession,
            patient_id.as_deref(),
            Some("Doe^John"),
        ))
    }

    fn accession(value: &str) -> AccessionNumber {
        AccessionNumber::new(value).unwrap()
    }

    fn ledger(dir: &TempDir) -> SqliteDedupStore {
        SqliteDedupStore::new(dir.path().join("sent_orders.db"))
    }

    fn pipeline<S: DedupStore>(
        store: S,
        items: Vec<WorkItem>,
        dispatcher: RecordingDispatcher,
    ) -> Pipeline<S, FixedFetcher, RecordingDispatcher> {
        Pipeline::new(
            store,
            FixedFetcher { items, fail: false },
            dispatcher,
            Duration::days(7),
        )
    }

    #[tokio::test]
    async fn forwards_new_and_skips_recently_sent() {
        let dir = TempDir::new().unwrap();
        let store = ledger(&dir);
        store.ensure_schema().unwrap();
        store
            .record_sent(&accession("200"), now() - Duration::days(2))
            .unwrap();

        let pipeline = pipeline(
            store,
            vec![item(Some("100")), item(Some("200"))],
            RecordingDispatcher::default(),
        );
        let report = pipeline.run_at(&filter(), now()).await.expect("run");

        assert_eq!(report.processed, 2);
        assert_eq!(report.sent, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(pipeline.dispatcher().sent_accessions(), vec!["100"]);
        assert_eq!(
            pipeline.store().last_sent_at(&accession("100")).unwrap(),
            Some(now())
        );
        assert_eq!(
            pipeline.store().last_sent_at(&accession("200")).unwrap(),
            Some(now() - Duration::days(2))
        );
    }

    #[tokio::test]
    async fn second_run_does_not_resend() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(
            ledger(&dir),
            vec![item(Some("100"))],
            RecordingDispatcher::default(),
        );

        let first = pipeline.run_at(&filter(), now()).await.unwrap();
        let second = pipeline
            .run_at(&filter(), now() + Duration::minutes(5))
            .await
            .unwrap();

        assert_eq!(first.sent, 1);
        assert_eq!(second.skipped, 1);
        assert_eq!(second.sent, 0);
        assert_eq!(pipeline.dispatcher().sent_accessions(), vec!["100"]);
        assert_eq!(pipeline.store().record_count().unwrap(), 1);
        assert_eq!(
            pipeline.store().last_sent_at(&accession("100")).unwrap(),
            Some(now())
        );
    }

    #[tokio::test]
    async fn resends_after_window_expires() {
        let dir = TempDir::new().unwrap();
        let store = ledger(&dir);
        store.ensure_schema().unwrap();
        store
            .record_sent(&accession("100"), now() - Duration::days(8))
            .unwrap();

        let pipeline = pipeline(store, vec![item(Some("100"))], RecordingDispatcher::default());
        let report = pipeline.run_at(&filter(), now()).await.unwrap();

        assert_eq!(report.sent, 1);
        assert_eq!(pipeline.dispatcher().sent_accessions(), vec!["100"]);
        assert_eq!(
            pipeline.store().last_sent_at(&accession("100")).unwrap(),
            Some(now())
        );
    }

    #[tokio::test]
    async fn one_failed_dispatch_does_not_block_the_rest() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(
            ledger(&dir),
            vec![item(Some("1")), item(Some("2")), item(Some("3"))],
            RecordingDispatcher::rejecting(&["2"]),
        );

        let report = pipeline.run_at(&filter(), now()).await.unwrap();

        assert_eq!(report.processed, 3);
        assert_eq!(report.sent, 2);
        assert_eq!(report.dispatch_failed, 1);
        assert_eq!(report.build_failed, 0);
        assert_eq!(pipeline.dispatcher().sent_accessions(), vec!["1", "3"]);
        assert_eq!(pipeline.store().record_count().unwrap(), 2);
        assert_eq!(pipeline.store().last_sent_at(&accession("2")).unwrap(), None);
    }

    #[tokio::test]
    async fn item_without_accession_never_reaches_dispatch() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(
            ledger(&dir),
            vec![item(Some("1")), item(None), item(Some("3"))],
            RecordingDispatcher::default(),
        );

        let report = pipeline.run_at(&filter(), now()).await.unwrap();

        assert_eq!(report.processed, 3);
        assert_eq!(report.sent, 2);
        assert_eq!(report.build_failed, 1);
        assert_eq!(report.dispatch_failed, 0);
        assert_eq!(pipeline.dispatcher().sent_accessions(), vec!["1", "3"]);
    }

    #[tokio::test]
    async fn duplicate_accession_in_one_batch_is_sent_once() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(
            ledger(&dir),
            vec![item(Some("100")), item(Some("100"))],
            RecordingDispatcher::default(),
        );

        let report = pipeline.run_at(&filter(), now()).await.unwrap();

        assert_eq!(report.sent, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(pipeline.dispatcher().sent_accessions(), vec!["100"]);
    }

    #[tokio::test]
    async fn fetch_failure_aborts_the_run() {
        let dir = TempDir::new().unwrap();
        let pipeline = Pipeline::new(
            ledger(&dir),
            FixedFetcher {
                items: vec![item(Some("100"))],
                fail: true,
            },
            RecordingDispatcher::default(),
            Duration::days(7),
        );

        let err = pipeline
            .run_at(&filter(), now())
            .await
            .expect_err("fetch failure must abort");

        assert!(matches!(err, PipelineError::Fetch(_)));
        assert!(pipeline.dispatcher().sent_accessions().is_empty());
        assert_eq!(pipeline.store().record_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn dedup_check_failure_aborts_before_sending() {
        let dir = TempDir::new().unwrap();
        let store = FlakyStore {
            inner: ledger(&dir),
            fail_check: true,
            fail_record: false,
        };
        let pipeline = pipeline(
            store,
            vec![item(Some("100")), item(Some("200"))],
            RecordingDispatcher::default(),
        );

        let err = pipeline
            .run_at(&filter(), now())
            .await
            .expect_err("check failure must abort");

        assert!(matches!(err, PipelineError::Storage(StorageError::Query(_))));
        assert!(pipeline.dispatcher().sent_accessions().is_empty());
    }

    #[tokio::test]
    async fn record_failure_is_counted_and_run_continues() {
        let dir = TempDir::new().unwrap();
        let store = FlakyStore {
            inner: ledger(&dir),
            fail_check: false,
            fail_record: true,
        };
        let pipeline = pipeline(
            store,
            vec![item(Some("100")), item(Some("200"))],
            RecordingDispatcher::default(),
        );

        let report = pipeline.run_at(&filter(), now()).await.unwrap();

        assert_eq!(report.processed, 2);
        assert_eq!(report.unrecorded, 2);
        assert_eq!(report.sent, 0);
        assert_eq!(pipeline.dispatcher().sent_accessions(), vec!["100", "200"]);
        assert_eq!(pipeline.store().inner.record_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn unusable_ledger_aborts_before_fetch() {
        let dir = TempDir::new().unwrap();
        let store = SqliteDedupStore::new(dir.path().join("missing").join("ledger.db"));
        let pipeline = pipeline(store, vec![item(Some("100"))], RecordingDispatcher::default());

        let err = pipeline
            .run_at(&filter(), now())
            .await
            .expect_err("schema failure must abort");

        assert!(matches!(err, PipelineError::Storage(_)));
        assert!(pipeline.dispatcher().sent_accessions().is_empty());
    }

    #[tokio::test]
    async fn window_before_representable_time_is_an_error() {
        let dir = TempDir::new().unwrap();
        let pipeline = Pipeline::new(
            ledger(&dir),
            FixedFetcher {
                items: vec![item(Some("100"))],
                fail: false,
            },
            RecordingDispatcher::default(),
            Duration::days(1_000_000_000),
        );

        let err = pipeline
            .run_at(&filter(), now())
            .await
            .expect_err("window start cannot be represented");

        assert!(matches!(err, PipelineError::Config(ConfigError::InvalidInput(_))));
        assert!(pipeline.dispatcher().sent_accessions().is_empty());
    }

    #[test]
    fn report_summary_line() {
        let mut report = RunReport::default();
        for outcome in [
            ItemOutcome::Sent,
            ItemOutcome::Skipped,
            ItemOutcome::Failed(FailedStage::Build),
            ItemOutcome::Failed(FailedStage::Dispatch),
            ItemOutcome::Failed(FailedStage::Dispatch),
        ] {
            report.tally(outcome);
        }

        assert_eq!(report.failed(), 3);
        assert_eq!(
            report.to_string(),
            "Processed 5 worklist items (1 sent, 1 skipped, 3 failed [1 build, 2 dispatch], 0 unrecorded)"
        );
    }

    mod over_dimse {
        use super::*;
        use crate::config::Endpoint;
        use crate::dispatch::DimseSender;
        use crate::fetch::DimseWorklist;
        use crate::testing::{text, Peer, Reply};
        use dicom_dictionary_std::tags;
        use dicom_uid::{GP_SCHEDULED_PROCEDURE_STEP_SOP_CLASS, MODALITY_WORKLIST_FIND_SOP_CLASS};

        fn endpoint(peer: &Peer, called_ae: &str) -> Endpoint {
            Endpoint::new(
                peer.addr.ip().to_string(),
                peer.addr.port(),
                "ORDER_ORM",
                called_ae,
            )
            .unwrap()
        }

        #[tokio::test]
        async fn end_to_end_against_dicom_peers() {
            let worklist = Peer::spawn(
                "WORKLIST",
                MODALITY_WORKLIST_FIND_SOP_CLASS,
                vec![
                    Reply::Match(identifier(Some("100"), Some("PID-100"), None)),
                    Reply::Match(identifier(Some("200"), Some("PID-200"), None)),
                    Reply::Match(identifier(None, Some("PID-X"), None)),
                    Reply::Done(0x0000),
                ],
            );
            // Accepts a single association, so a second send would fail the item.
            let orders = Peer::spawn(
                "ORDERS",
                GP_SCHEDULED_PROCEDURE_STEP_SOP_CLASS,
                vec![Reply::Done(0x0000)],
            );

            let dir = TempDir::new().unwrap();
            let store = ledger(&dir);
            store.ensure_schema().unwrap();
            store
                .record_sent(&accession("200"), now() - Duration::days(2))
                .unwrap();

            let timeout = std::time::Duration::from_secs(5);
            let pipeline = Pipeline::new(
                store,
                DimseWorklist::new(endpoint(&worklist, "WORKLIST"), timeout),
                DimseSender::new(endpoint(&orders, "ORDERS"), timeout),
                Duration::days(7),
            );

            let report = pipeline.run_at(&filter(), now()).await.expect("run");

            assert_eq!(report.processed, 2);
            assert_eq!(report.sent, 1);
            assert_eq!(report.skipped, 1);
            assert_eq!(report.failed(), 0);
            assert_eq!(
                pipeline.store().last_sent_at(&accession("100")).unwrap(),
                Some(now())
            );

            assert_eq!(worklist.finish().expect("worklist peer").requests.len(), 1);
            let orders = orders.finish().expect("orders peer");
            assert_eq!(orders.requests.len(), 1);
            let stored = orders.requests[0].data.as_ref().expect("data set");
            assert_eq!(text(stored, tags::ACCESSION_NUMBER).as_deref(), Some("100"));
            assert_eq!(text(stored, tags::PATIENT_ID).as_deref(), Some("PID-100"));
        }
    }
}

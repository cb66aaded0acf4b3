//! End-to-end tests of the pipeline engine over mock sources.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::config::{DebugOptions, EngineConfig};
use crate::context::QueryContext;
use crate::errors::{BuildError, ItemError, PipelineError};
use crate::functions::arithmetic::round_up;
use crate::functions::items::item_with_max;
use crate::functions::{callback, collectors, comparison, statistics};
use crate::item::{Field, Item, Value, GROUPED_ITEMS, TIME_CREATED};
use crate::purpose::Purpose;
use crate::source::mock::{EmptySource, FailingSource, FixedSource, MockSensor, READING, SEQ};
use crate::source::{Source, SourceFactory};

const X: Field<i64> = Field::new("x");
const CONTACT: Field<String> = Field::new("contact");
const CALLS: Field<i64> = Field::new("#calls");

fn items_with_x(values: &[i64]) -> Vec<Item> {
    values
        .iter()
        .map(|v| Item::new().with_field("x", *v))
        .collect()
}

fn call_log() -> Vec<Item> {
    ["ana", "bo", "ana", "cy", "ana", "bo"]
        .iter()
        .map(|contact| Item::new().with_field("contact", *contact))
        .collect()
}

/// Source factory that counts how many times a fresh source was created.
#[derive(Clone)]
struct CountingSource {
    items: Vec<Item>,
    created: Arc<AtomicUsize>,
}

impl SourceFactory for CountingSource {
    fn create(&self) -> Box<dyn Source> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Box::new(FixedSource::new(self.items.clone()))
    }

    fn name(&self) -> &str {
        "counting"
    }
}

// -- limits and counting ----------------------------------------------------

#[tokio::test]
async fn count_respects_limit() {
    let ctx = QueryContext::new();
    let items = items_with_x(&(0..10).collect::<Vec<_>>());

    let limited = ctx
        .get_data(FixedSource::new(items.clone()), Purpose::test("limit"))
        .limit(4)
        .count()
        .await
        .unwrap();
    assert_eq!(limited, 4);

    let exact = ctx
        .get_data(FixedSource::new(items.clone()), Purpose::test("limit"))
        .limit(10)
        .count()
        .await
        .unwrap();
    assert_eq!(exact, 10);

    // A limit beyond the source size just sees the whole source.
    let oversized = ctx
        .get_data(FixedSource::new(items), Purpose::test("limit"))
        .limit(15)
        .count()
        .await
        .unwrap();
    assert_eq!(oversized, 10);
}

#[tokio::test]
async fn limit_counts_items_reaching_its_own_stage() {
    let ctx = QueryContext::new();
    let items = items_with_x(&(0..20).collect::<Vec<_>>());

    // Staged after the filter, the limit counts post-filter items.
    let post_filter = ctx
        .get_data(FixedSource::new(items.clone()), Purpose::test("ordering"))
        .filter(comparison::gt(X, 9))
        .limit(5)
        .count()
        .await
        .unwrap();
    assert_eq!(post_filter, 5);

    // Staged before the filter, it caps what the filter even sees.
    let pre_filter = ctx
        .get_data(FixedSource::new(items), Purpose::test("ordering"))
        .limit(5)
        .filter(comparison::gt(X, 2))
        .count()
        .await
        .unwrap();
    assert_eq!(pre_filter, 2);
}

#[tokio::test]
async fn limit_stops_an_infinite_source() {
    let ctx = QueryContext::new();
    let counted = tokio::time::timeout(
        Duration::from_secs(5),
        ctx.get_data(
            MockSensor::updates(Duration::from_millis(1), 1.0),
            Purpose::test("bounded view of an unbounded source"),
        )
        .limit(7)
        .count(),
    )
    .await
    .expect("limited pipeline must terminate")
    .unwrap();
    assert_eq!(counted, 7);
}

#[tokio::test]
async fn collect_preserves_arrival_order() {
    let ctx = QueryContext::new();
    let items = ctx
        .get_data(MockSensor::bounded(10, 1.0), Purpose::test("order"))
        .collect()
        .await
        .unwrap();
    let seqs: Vec<i64> = items.iter().map(|item| item.get(SEQ).unwrap()).collect();
    assert_eq!(seqs, (0..10).collect::<Vec<_>>());
}

// -- per-item errors --------------------------------------------------------

#[tokio::test]
async fn filter_skips_items_missing_the_field() {
    let ctx = QueryContext::new();
    let mut items = items_with_x(&[1, 3]);
    items.insert(1, Item::new());

    let counted = ctx
        .get_data(
            FixedSource::spaced(items, Duration::from_millis(1)),
            Purpose::test("skips"),
        )
        .filter(comparison::gt(X, 0))
        .count()
        .await
        .unwrap();
    assert_eq!(counted, 2);
}

#[tokio::test]
async fn if_present_reports_missing_fields_without_stopping_siblings() {
    let ctx = QueryContext::new();
    let mut items = items_with_x(&[1, 3]);
    items.insert(1, Item::new());

    let (ok_tx, mut ok_rx) = mpsc::unbounded_channel();
    let (err_tx, mut err_rx) = mpsc::unbounded_channel();
    let handle = ctx
        .get_data(FixedSource::new(items), Purpose::test("if_present"))
        .if_present(
            X,
            callback(
                move |value: i64| ok_tx.send(value).unwrap(),
                move |error| err_tx.send(error).unwrap(),
            ),
        );
    handle.await.unwrap();

    let mut delivered = Vec::new();
    while let Ok(value) = ok_rx.try_recv() {
        delivered.push(value);
    }
    assert_eq!(delivered, vec![1, 3]);

    let failure = err_rx.try_recv().unwrap();
    assert!(matches!(
        failure,
        PipelineError::Item(ItemError::MissingField { .. })
    ));
    assert!(err_rx.try_recv().is_err());
}

// -- field derivation -------------------------------------------------------

#[tokio::test]
async fn set_field_derives_per_item() {
    let ctx = QueryContext::new();
    let items = ctx
        .get_data(FixedSource::new(items_with_x(&[2, 5])), Purpose::test("derive"))
        .set_field("doubled", |item: &Item| -> Result<Value, ItemError> {
            Ok(Value::Int(X.get(item)? * 2))
        })
        .collect()
        .await
        .unwrap();
    let doubled: Vec<i64> = items
        .iter()
        .map(|item| item.get_value("doubled").unwrap().as_int().unwrap())
        .collect();
    assert_eq!(doubled, vec![4, 10]);
}

#[tokio::test]
async fn set_independent_field_evaluates_once_per_execution() {
    let ctx = QueryContext::new();
    let evaluations = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&evaluations);
    let provider = move || -> Result<Value, ItemError> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Value::Int(42))
    };

    let items = ctx
        .get_data(
            FixedSource::new(items_with_x(&[1, 2, 3, 4, 5])),
            Purpose::test("independent"),
        )
        .set_independent_field("run_id", provider)
        .collect()
        .await
        .unwrap();

    assert_eq!(items.len(), 5);
    for item in &items {
        assert_eq!(item.get_value("run_id"), Some(&Value::Int(42)));
    }
    assert_eq!(evaluations.load(Ordering::SeqCst), 1);
}

// -- grouping ---------------------------------------------------------------

#[tokio::test]
async fn group_select_is_deterministic_over_fixed_input() {
    let ctx = QueryContext::new();
    let mut winners = Vec::new();
    for _ in 0..2 {
        let selected = ctx
            .get_data(FixedSource::new(call_log()), Purpose::social("closest contact"))
            .group_by(CONTACT.name())
            .set_group_field(CALLS.name(), statistics::count())
            .unwrap()
            .select(item_with_max(CALLS))
            .unwrap()
            .collect()
            .await
            .unwrap();
        assert_eq!(selected.len(), 1);
        winners.push((
            selected[0].get(CONTACT).unwrap(),
            selected[0].get(CALLS).unwrap(),
        ));
    }
    assert_eq!(winners[0], ("ana".to_string(), 3));
    assert_eq!(winners[0], winners[1]);
}

#[tokio::test]
async fn empty_source_selection_reports_absence() {
    let ctx = QueryContext::new();
    let (err_tx, mut err_rx) = mpsc::unbounded_channel();
    let handle = ctx
        .get_data(FixedSource::new(Vec::new()), Purpose::test("empty"))
        .group_by(CONTACT.name())
        .set_group_field(CALLS.name(), statistics::count())
        .unwrap()
        .select(item_with_max(CALLS))
        .unwrap()
        .if_present(
            CONTACT,
            callback(
                |_contact: String| panic!("nothing should be delivered"),
                move |error| err_tx.send(error).unwrap(),
            ),
        );
    handle.await.unwrap();

    assert!(matches!(
        err_rx.try_recv().unwrap(),
        PipelineError::NoResult
    ));
}

#[tokio::test]
async fn local_group_by_emits_on_key_change_and_flushes_at_completion() {
    let ctx = QueryContext::new();
    let groups = ctx
        .get_data(
            FixedSource::new(items_with_x(&[1, 1, 2, 2, 2, 3])),
            Purpose::test("incremental batching"),
        )
        .local_group_by("x")
        .collect()
        .await
        .unwrap();

    let keys: Vec<i64> = groups.iter().map(|g| g.get(X).unwrap()).collect();
    assert_eq!(keys, vec![1, 2, 3]);
    let sizes: Vec<usize> = groups
        .iter()
        .map(|g| g.get(GROUPED_ITEMS).unwrap().len())
        .collect();
    assert_eq!(sizes, vec![2, 3, 1]);
}

#[tokio::test]
async fn grouped_reducers_require_a_grouping_stage() {
    let ctx = QueryContext::new();
    let ungrouped = ctx.get_data(FixedSource::new(call_log()), Purpose::test("build error"));
    let error = ungrouped
        .clone()
        .set_group_field(CALLS.name(), statistics::count())
        .unwrap_err();
    assert_eq!(
        error,
        BuildError::NotGrouped {
            operation: "set_group_field"
        }
    );
    assert!(matches!(
        ungrouped.select(item_with_max(CALLS)),
        Err(BuildError::NotGrouped { .. })
    ));
}

#[tokio::test]
async fn time_bucketed_batching_over_a_live_source() {
    let ctx = QueryContext::new();
    let batches = ctx
        .get_data(
            MockSensor::updates(Duration::from_millis(10), 1.0),
            Purpose::health("batch readings"),
        )
        .limit(12)
        .timeout(Duration::from_secs(10))
        .set_field("bucket", round_up(TIME_CREATED, 50))
        .local_group_by("bucket")
        .set_group_field("size", statistics::count())
        .unwrap()
        .collect()
        .await
        .unwrap();

    let total: i64 = batches
        .iter()
        .map(|batch| batch.get_value("size").unwrap().as_int().unwrap())
        .sum();
    assert_eq!(total, 12);
    assert!(!batches.is_empty());
}

// -- multicast / reuse ------------------------------------------------------

#[tokio::test]
async fn branches_observe_identical_sequences() {
    let ctx = QueryContext::new();
    let shared = ctx
        .get_data(MockSensor::bounded(20, 10.0), Purpose::test("reuse"))
        .limit(20)
        .reuse(2)
        .unwrap();

    // Branches consumed one after the other: the second replays from its
    // buffered backlog.
    let first = shared.branch().unwrap().collect().await.unwrap();
    let second = shared.branch().unwrap().collect().await.unwrap();
    assert_eq!(first.len(), 20);
    assert_eq!(first, second);
}

#[tokio::test]
async fn branch_operators_are_independent() {
    let ctx = QueryContext::new();
    let shared = ctx
        .get_data(MockSensor::bounded(50, 10.0), Purpose::test("reuse"))
        .reuse(3)
        .unwrap();

    let total = shared.branch().unwrap().count().await.unwrap();
    let high = shared
        .branch()
        .unwrap()
        .filter(comparison::gt(READING, 5.0))
        .count()
        .await
        .unwrap();
    let low = shared
        .branch()
        .unwrap()
        .filter(comparison::lte(READING, 5.0))
        .count()
        .await
        .unwrap();

    assert_eq!(total, 50);
    assert_eq!(high + low, total);
}

#[tokio::test]
async fn branch_limit_does_not_starve_siblings() {
    let ctx = QueryContext::new();
    let shared = ctx
        .get_data(MockSensor::bounded(30, 1.0), Purpose::test("reuse"))
        .reuse(2)
        .unwrap();

    let truncated = shared.branch().unwrap().limit(3).count().await.unwrap();
    let full = shared.branch().unwrap().count().await.unwrap();
    assert_eq!(truncated, 3);
    assert_eq!(full, 30);
}

#[tokio::test]
async fn multicast_points_never_grow() {
    let ctx = QueryContext::new();
    assert_eq!(
        ctx.get_data(MockSensor::bounded(1, 1.0), Purpose::test("reuse"))
            .reuse(0)
            .unwrap_err(),
        BuildError::ZeroBranches
    );

    let shared = ctx
        .get_data(MockSensor::bounded(1, 1.0), Purpose::test("reuse"))
        .reuse(1)
        .unwrap();
    assert_eq!(shared.remaining_branches(), 1);
    let _branch = shared.branch().unwrap();
    assert_eq!(
        shared.branch().unwrap_err(),
        BuildError::BranchesExhausted { count: 1 }
    );
}

#[tokio::test]
async fn upstream_failure_reaches_every_branch() {
    let ctx = QueryContext::new();
    let shared = ctx
        .get_data(FailingSource::new(2, "sensor unplugged"), Purpose::test("reuse"))
        .reuse(2)
        .unwrap();

    for _ in 0..2 {
        let error = shared.branch().unwrap().collect().await.unwrap_err();
        assert!(matches!(error, PipelineError::Source { .. }));
    }
}

#[tokio::test]
async fn a_branch_cannot_be_executed_twice() {
    let ctx = QueryContext::new();
    let shared = ctx
        .get_data(MockSensor::bounded(2, 1.0), Purpose::test("reuse"))
        .reuse(1)
        .unwrap();
    let branch = shared.branch().unwrap();
    let replayed = branch.clone();

    branch.count().await.unwrap();
    let error = replayed.count().await.unwrap_err();
    assert!(matches!(error, PipelineError::Source { .. }));
}

// -- compound sub-queries ---------------------------------------------------

#[tokio::test]
async fn compound_reruns_the_inner_pipeline_per_item() {
    let ctx = QueryContext::new();
    let created = Arc::new(AtomicUsize::new(0));
    let inner_source = CountingSource {
        items: call_log(),
        created: Arc::clone(&created),
    };
    let inner = ctx.get_data(inner_source, Purpose::test("inner"));

    let outer = ctx
        .get_data(FixedSource::new(items_with_x(&[1, 2, 3])), Purpose::test("outer"))
        .set_field("contacts", inner.compound(collectors::to_item_list()))
        .collect()
        .await
        .unwrap();

    assert_eq!(outer.len(), 3);
    for item in &outer {
        let contacts = item.get_value("contacts").unwrap().as_items().unwrap();
        assert_eq!(contacts.len(), 6);
    }
    assert_eq!(created.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn compound_as_independent_field_runs_once() {
    let ctx = QueryContext::new();
    let created = Arc::new(AtomicUsize::new(0));
    let inner_source = CountingSource {
        items: call_log(),
        created: Arc::clone(&created),
    };
    let inner = ctx.get_data(inner_source, Purpose::test("inner"));

    let outer = ctx
        .get_data(FixedSource::new(items_with_x(&[1, 2, 3])), Purpose::test("outer"))
        .set_independent_field("contact_count", inner.compound(collectors::item_count()))
        .collect()
        .await
        .unwrap();

    assert_eq!(outer.len(), 3);
    for item in &outer {
        assert_eq!(item.get_value("contact_count"), Some(&Value::Int(6)));
    }
    assert_eq!(created.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn inner_failure_is_recoverable_on_the_outer_item() {
    let ctx = QueryContext::new();
    let inner = ctx.get_data(FailingSource::new(0, "inner broke"), Purpose::test("inner"));

    // Every outer item fails its sub-query field; the outer pipeline lives.
    let counted = ctx
        .get_data(FixedSource::new(items_with_x(&[1, 2])), Purpose::test("outer"))
        .set_field("inner_items", inner.compound(collectors::to_item_list()))
        .count()
        .await
        .unwrap();
    assert_eq!(counted, 0);
}

#[tokio::test]
async fn value_generator_snapshots_without_blocking() {
    let ctx = QueryContext::new();
    let inner = ctx.get_data(
        MockSensor::updates(Duration::from_millis(5), 1.0),
        Purpose::test("continuous inner"),
    );
    let generator = inner.value_generator(collectors::item_count());
    tokio::time::sleep(Duration::from_millis(100)).await;

    let outer = ctx
        .get_data(
            EmptySource::bounded(1, Duration::ZERO),
            Purpose::test("heartbeat outer"),
        )
        .set_independent_field("inner_count", generator)
        .collect()
        .await
        .unwrap();
    let snapshot = outer[0].get_value("inner_count").unwrap().as_int().unwrap();
    assert!(snapshot >= 1, "generator saw {snapshot} inner items");

    ctx.stop_all();
    for _ in 0..100 {
        if ctx.registry().active_count() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("generator execution was not stopped");
}

// -- cancellation and timeout -----------------------------------------------

#[tokio::test]
async fn timeout_terminates_an_infinite_source() {
    let ctx = QueryContext::new();
    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        ctx.get_data(
            MockSensor::updates(Duration::from_millis(1), 1.0),
            Purpose::test("unbounded"),
        )
        .timeout(Duration::from_millis(100))
        .count(),
    )
    .await
    .expect("watchdog must fire well inside the margin");

    assert!(matches!(outcome, Err(PipelineError::Timeout { .. })));
}

#[tokio::test]
async fn stop_all_cancels_live_pipelines() {
    let ctx = QueryContext::new();
    let counting = tokio::spawn(
        ctx.get_data(
            MockSensor::updates(Duration::from_millis(1), 1.0),
            Purpose::test("runs until stopped"),
        )
        .count(),
    );
    tokio::time::sleep(Duration::from_millis(50)).await;

    ctx.stop_all();
    let outcome = counting.await.unwrap();
    assert!(matches!(outcome, Err(PipelineError::Cancelled)));
}

#[tokio::test]
async fn registry_exposes_purpose_for_auditing() {
    let ctx = QueryContext::new();
    let handle = ctx
        .get_data(
            MockSensor::updates(Duration::from_millis(5), 1.0),
            Purpose::feature("live wallpaper"),
        )
        .for_each_item(callback(|_item: Item| {}, |_error| {}));

    let mut seen = false;
    for _ in 0..100 {
        let active = ctx.registry().active();
        if let Some(info) = active.first() {
            assert_eq!(info.purpose, Purpose::feature("live wallpaper"));
            assert_eq!(info.source, "mock_sensor");
            seen = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(seen, "execution never appeared in the audit view");

    ctx.stop_all();
    handle.await.unwrap();
}

// -- failure delivery -------------------------------------------------------

#[tokio::test]
async fn source_failure_surfaces_once_from_an_awaited_terminal() {
    let ctx = QueryContext::new();
    let error = ctx
        .get_data(FailingSource::new(3, "sensor unplugged"), Purpose::test("fatal"))
        .count()
        .await
        .unwrap_err();
    match error {
        PipelineError::Source { message, .. } => assert_eq!(message, "sensor unplugged"),
        other => panic!("expected a source failure, got {other}"),
    }
}

#[tokio::test]
async fn callback_terminals_get_exactly_one_fatal_failure() {
    let ctx = QueryContext::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let items_tx = tx.clone();
    let handle = ctx
        .get_data(FailingSource::new(2, "boom"), Purpose::test("fatal"))
        .for_each_item(callback(
            move |_item: Item| items_tx.send("item").unwrap(),
            move |error| {
                if error.is_fatal() {
                    tx.send("fatal").unwrap();
                }
            },
        ));
    handle.await.unwrap();

    let mut deliveries = Vec::new();
    while let Ok(kind) = rx.try_recv() {
        deliveries.push(kind);
    }
    assert_eq!(deliveries, vec!["item", "item", "fatal"]);
}

// -- debug sink -------------------------------------------------------------

#[tokio::test]
async fn log_as_broadcasts_tagged_items() {
    use tokio::io::AsyncReadExt;

    let config = EngineConfig {
        debug: DebugOptions { port: 0 },
        ..EngineConfig::default()
    };
    let ctx = QueryContext::with_config(config);
    let addr = ctx.debug_server().ensure_started().await.unwrap();

    let mut client = TcpStream::connect(("127.0.0.1", addr.port())).await.unwrap();
    for _ in 0..200 {
        if ctx.debug_server().client_count().await == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    ctx.get_data(
        FixedSource::new(vec![Item::new().with_field("n", 7)]),
        Purpose::test("inspection"),
    )
    .log_as("probe")
    .count()
    .await
    .unwrap();

    let mut header = [0u8; 6];
    client.read_exact(&mut header).await.unwrap();
    assert_eq!(header[0], 0xFF);
    assert_eq!(header[1], 0x00);
    let len = u32::from_be_bytes([header[2], header[3], header[4], header[5]]) as usize;
    let mut payload = vec![0u8; len];
    client.read_exact(&mut payload).await.unwrap();

    let parsed: serde_json::Value = serde_json::from_slice(&payload).unwrap();
    assert_eq!(parsed["tag"], "probe");
    assert_eq!(parsed["item"]["n"], 7);
}

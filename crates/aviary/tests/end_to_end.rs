//! Sampling and verification against an in-memory cluster, through the
//! aviary file on disk.

use std::sync::Arc;

use aviary::core::{KeyColumn, Row};
use aviary::drivers::partition_token;
use aviary::{
    AviaryReader, Config, KeyValue, MemoryCluster, Orchestrator, Origin, Phase, TableKeys,
};
use tokio_util::sync::CancellationToken;

struct Fixture {
    _dir: tempfile::TempDir,
    cluster: Arc<MemoryCluster>,
    orchestrator: Orchestrator,
    origin: Origin,
    config: Config,
}

/// One table of four rows, with a ring placing each row in its own range.
fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("aviary.json").to_string_lossy().into_owned();

    let origin = Origin::new("shop", "orders");
    let keys = TableKeys::new(
        &origin,
        vec![
            KeyColumn::partition("id", "bigint"),
            KeyColumn::clustering("sku", "text"),
        ],
    )
    .unwrap();

    let cluster = Arc::new(MemoryCluster::new());
    cluster.create_table(origin.clone(), keys);
    let mut tokens = Vec::new();
    for id in 0..4i64 {
        let row = Row::new().with("id", id).with("sku", format!("sku-{}", id));
        tokens.push(cluster.insert(&origin, row).unwrap());
    }
    tokens.sort_unstable();
    cluster.set_ring(tokens[..3].to_vec());

    // Another table the filter must keep out of the run.
    let other = Origin::new("audit", "log");
    cluster.create_table(
        other.clone(),
        TableKeys::new(&other, vec![KeyColumn::partition("day", "text")]).unwrap(),
    );
    cluster
        .insert(&other, Row::new().with("day", "2024-01-01"))
        .unwrap();

    let mut config = Config::default();
    config.sampling.output = file.clone();
    config.verification.input = file;
    config.filters = vec!["shop".into()];
    config.tasks.max_in_flight = 2;

    let orchestrator = Orchestrator::with_cluster(config.clone(), cluster.clone(), cluster.clone());
    Fixture {
        _dir: dir,
        cluster,
        orchestrator,
        origin,
        config,
    }
}

#[tokio::test]
async fn test_sample_verify_delete_verify() {
    let f = fixture();

    let selected = f.orchestrator.select(CancellationToken::new()).await.unwrap();
    assert_eq!(selected.phase.phase, Phase::Sampling);
    assert_eq!(selected.phase.lines().collect::<Vec<_>>(), vec!["shop.orders: 4/4"]);
    assert_eq!(selected.phase.filtered_out, 1);
    assert_eq!(selected.phase.tasks.dispatched, 4);
    assert!(!selected.phase.cancelled());

    let stored: Vec<_> = AviaryReader::new(&f.config.sampling.output)
        .iter()
        .unwrap()
        .collect::<aviary::Result<_>>()
        .unwrap();
    assert_eq!(stored.len(), 4);
    assert!(stored.iter().all(|c| c.origin() == &f.origin));

    let first = f.orchestrator.verify(CancellationToken::new()).await.unwrap();
    assert_eq!(first.phase.lines().collect::<Vec<_>>(), vec!["shop.orders: 4/4"]);

    let second = f.orchestrator.verify(CancellationToken::new()).await.unwrap();
    assert_eq!(second.phase.origins, first.phase.origins);

    let deleted = f
        .cluster
        .delete(&f.origin, &Row::new().with("id", 2i64).with("sku", "sku-2"));
    assert_eq!(deleted, 1);

    let third = f.orchestrator.verify(CancellationToken::new()).await.unwrap();
    let line = third.phase.origin(&f.origin).unwrap();
    assert_eq!(line.to_string(), "shop.orders: 3/4");
    assert_eq!(line.details["missing"], 1);
}

#[tokio::test]
async fn test_each_range_holds_one_row() {
    let f = fixture();
    f.orchestrator.select(CancellationToken::new()).await.unwrap();

    let scans = f.cluster.range_scans();
    assert_eq!(scans.len(), 4);
    for id in 0..4i64 {
        let token = partition_token(&[KeyValue::Int(id)]);
        let holding = scans.iter().filter(|(_, range)| range.contains(token)).count();
        assert_eq!(holding, 1, "row {} is covered by {} ranges", id, holding);
    }
}

#[tokio::test]
async fn test_cancelled_verification_reports_cancellation() {
    let f = fixture();
    f.orchestrator.select(CancellationToken::new()).await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = f.orchestrator.verify(cancel).await.unwrap();
    assert!(report.phase.cancelled());
    assert_eq!(report.phase.tasks.dispatched, 0);
}

#[tokio::test]
async fn test_json_report_carries_run_metadata() {
    let f = fixture();
    let report = f.orchestrator.select(CancellationToken::new()).await.unwrap();

    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["phase"], "sampling");
    assert_eq!(json["strategy"], "range");
    assert_eq!(json["cluster"], "memory");
    assert_eq!(json["config_hash"], f.config.hash());
    assert_eq!(json["origins"][0]["success"], 4);
}

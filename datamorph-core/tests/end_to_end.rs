//! Exercises the wired-together [`Coordinator`] end-to-end: open a fixture,
//! let the background index/schema passes settle, then apply an action
//! stack and read the transformed view back.

use std::time::Duration;

use datamorph_core::{Coordinator, EngineConfig, MorphAction, Operator, SourceFormat, TableSource};
use datamorph_test_utils::{csv_fixture, jsonl_fixture};

async fn settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[tokio::test]
async fn opens_csv_file_and_exposes_schema_and_rows() {
    init_tracing();
    let file = csv_fixture(30);
    let coordinator = Coordinator::open(file.path(), SourceFormat::Csv, EngineConfig::default())
        .await
        .unwrap();
    settle().await;

    let schema = coordinator.schema();
    assert_eq!(schema.len(), 3);
    assert_eq!(schema.column(0).unwrap().name, "id");
    assert_eq!(coordinator.total_rows(), 30);

    let table = coordinator.table();
    assert_eq!(table.rows(), 30);
    assert_eq!(table.cell(5, 1).unwrap(), "user5");
}

#[tokio::test]
async fn rename_delete_cast_projects_a_new_view() {
    let file = csv_fixture(20);
    let mut coordinator = Coordinator::open(file.path(), SourceFormat::Csv, EngineConfig::default())
        .await
        .unwrap();
    settle().await;

    coordinator
        .apply_actions(vec![
            MorphAction::Rename { old: "id".into(), new: "row_id".into() },
            MorphAction::Delete { name: "score".into() },
        ])
        .unwrap();

    let table = coordinator.table();
    assert_eq!(table.column_names(), vec!["row_id".to_string(), "name".to_string()]);
    assert_eq!(table.rows(), 20);
    assert_eq!(table.cell(7, 0).unwrap(), "7");
    assert_eq!(table.cell(7, 1).unwrap(), "user7");
}

#[tokio::test]
async fn filter_action_narrows_rows_in_the_background() {
    let file = csv_fixture(50);
    let mut coordinator = Coordinator::open(file.path(), SourceFormat::Csv, EngineConfig::default())
        .await
        .unwrap();
    settle().await;

    coordinator
        .apply_actions(vec![MorphAction::Filter {
            name: "name".into(),
            op: Operator::Equals,
            value: "user10".into(),
        }])
        .unwrap();
    settle().await;

    let table = coordinator.table();
    assert_eq!(table.rows(), 1);
    assert_eq!(table.cell(0, 0).unwrap(), "10");
}

#[tokio::test]
async fn jsonlines_file_seeds_schema_from_object_keys() {
    let file = jsonl_fixture(25);
    let coordinator = Coordinator::open(file.path(), SourceFormat::JsonLines, EngineConfig::default())
        .await
        .unwrap();
    settle().await;

    let schema = coordinator.schema();
    assert_eq!(schema.len(), 3);
    assert_eq!(schema.column(0).unwrap().name, "id");
    assert_eq!(schema.column(1).unwrap().name, "name");
    assert_eq!(schema.column(2).unwrap().name, "active");

    let table = coordinator.table();
    assert_eq!(table.cell(3, 1).unwrap(), "user3");
}

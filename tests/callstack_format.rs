mod common;

use asyncscope::engine::{Engine, EngineOptions};
use asyncscope::report::{self, ReportModel, SerializerKind};
use common::seed_at;
use std::path::{Path, PathBuf};

fn fixture_engine() -> Engine {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");
    let mut engine = Engine::new(root, EngineOptions::default());
    engine.append_file(Path::new("top-functions.js")).unwrap();
    engine.parse().unwrap();
    engine
}

#[test]
fn top_functions_serialization_matches_the_fixture() {
    let engine = fixture_engine();
    let seed = seed_at(&engine, "top-functions.js", 19, 0);
    let report = ReportModel::new(&engine, seed).unwrap();
    let text = report::write_text(&report).unwrap();

    let expected = std::fs::read_to_string(
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/expected-callstack.txt"),
    )
    .unwrap();
    assert_eq!(text, expected);
}

#[test]
fn markdown_and_json_render_the_same_data() {
    let engine = fixture_engine();
    let seed = seed_at(&engine, "top-functions.js", 19, 0);
    let report = ReportModel::new(&engine, seed).unwrap();

    let markdown = report::render(&report, SerializerKind::Markdown).unwrap();
    assert!(markdown.contains("# Async propagation report"));
    assert!(markdown.contains("## `readBlob` at `top-functions.js:19 FunctionDeclaration[0]`"));
    assert!(markdown.contains("marks `loadEntries`"));

    let json = report::render(&report, SerializerKind::Json).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["seed"]["name"], "readBlob");
    assert_eq!(value["functions"][0]["awaits"][0]["marks"]["name"], "loadEntries");
    assert_eq!(value["alsoMarked"][0]["name"], "renderAll");
}

#[test]
fn sorted_edges_dedupe_and_order_by_location() {
    let mut engine = Engine::new(PathBuf::from("."), EngineOptions::default());
    engine
        .append_source(
            Path::new("sorted.js"),
            1,
            "function target() {}\n\
             function late() { target(); }\n\
             function early() { target(); target(); }\n",
        )
        .unwrap();
    engine.parse().unwrap();
    let target = seed_at(&engine, "sorted.js", 1, 0);

    let report = ReportModel::new(&engine, target).unwrap().with_sorted_edges();
    let edges = report
        .async_map()
        .get(asyncscope::engine::propagate::AsyncSource::Function(target))
        .unwrap();
    let lines: Vec<u32> = edges
        .iter()
        .map(|e| common::origin_of(&engine, e.await_site.unwrap()).1)
        .collect();
    assert_eq!(lines, vec![2, 3, 3]);
}

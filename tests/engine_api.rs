mod common;

use asyncscope::engine::{Engine, EngineOptions};
use asyncscope::error::AsyncscopeError;
use common::{engine_from, seed_at};
use std::path::{Path, PathBuf};

#[test]
fn syntax_errors_surface_with_their_origin() {
    let mut engine = Engine::new(PathBuf::from("."), EngineOptions::default());
    engine
        .append_source(Path::new("good.js"), 1, "function ok() {}\n")
        .unwrap();
    engine
        .append_source(Path::new("broken.js"), 1, "function (oops {\n")
        .unwrap();
    match engine.parse() {
        Err(AsyncscopeError::Syntax(msg)) => {
            assert!(msg.contains("broken.js"), "origin missing from: {msg}")
        }
        other => panic!("expected a Syntax failure, got {other:?}"),
    }
}

#[test]
fn append_file_failures_are_typed() {
    let outer = tempfile::tempdir().unwrap();
    let root = outer.path().join("root");
    std::fs::create_dir(&root).unwrap();
    std::fs::write(outer.path().join("outside.js"), "function x() {}\n").unwrap();

    let mut engine = Engine::new(root, EngineOptions::default());
    assert!(matches!(
        engine.append_file(Path::new("no-such-file.js")),
        Err(AsyncscopeError::Io(_))
    ));
    assert!(matches!(
        engine.append_file(Path::new("../outside.js")),
        Err(AsyncscopeError::PathEscape(_))
    ));
}

#[test]
fn append_file_is_idempotent_through_the_engine() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("s.js"), "function f() {}\nf();\n").unwrap();

    let mut engine = Engine::new(dir.path().to_path_buf(), EngineOptions::default());
    let first = engine.append_file(Path::new("s.js")).unwrap();
    let second = engine.append_file(Path::new("s.js")).unwrap();
    assert_eq!(first, second);
    engine.parse().unwrap();
    assert_eq!(engine.buffer().line_count(), 2);
}

#[test]
fn every_buffer_line_maps_back_to_its_fragment() {
    let engine = engine_from(&[
        ("one.js", "function a() {\n  b();\n}\n"),
        ("two.js", "function b() {}\n"),
        ("one.js", "a();\n"),
    ]);
    let buffer = engine.buffer();
    assert_eq!(buffer.line_count(), 5);
    assert_eq!(
        buffer.serialize_mapping(),
        "1 one.js:1\n2 one.js:2\n3 one.js:3\n4 two.js:1\n5 one.js:1\n"
    );

    // Every parsed node's origin agrees with the line map
    let ast = engine.ast().unwrap();
    let index = engine.index().unwrap();
    for (id, node) in ast.iter() {
        let (path, line) = index.origin(id);
        let (expected_path, expected_line) = buffer.locate_origin(node.span.line).unwrap();
        assert_eq!((path, line), (expected_path, expected_line));
    }
}

#[test]
fn async_stacks_are_idempotent() {
    let engine = engine_from(&[(
        "idem.js",
        "function c() {}\n\
         function b() { c(); }\n\
         function a() { b(); c(); }\n",
    )]);
    let c = seed_at(&engine, "idem.js", 1, 0);

    let first = engine.get_async_stacks(c).unwrap();
    let second = engine.get_async_stacks(c).unwrap();

    let flatten = |map: &asyncscope::engine::propagate::AsyncMap| {
        map.iter()
            .map(|(source, edges)| (source, edges.to_vec()))
            .collect::<Vec<_>>()
    };
    assert_eq!(flatten(&first), flatten(&second));
}

#[test]
fn reparse_invalidates_previous_state() {
    let mut engine = Engine::new(PathBuf::from("."), EngineOptions::default());
    engine
        .append_source(Path::new("a.js"), 1, "function a() {}\n")
        .unwrap();
    engine.parse().unwrap();
    let before = seed_at(&engine, "a.js", 1, 0);
    engine.mark_ignored(before);
    assert_eq!(engine.ignored().len(), 1);

    engine
        .append_source(Path::new("b.js"), 1, "function b() {}\n")
        .unwrap();
    engine.parse().unwrap();
    // The ignore set refers to node ids of the dropped parse
    assert!(engine.ignored().is_empty());
    assert!(engine
        .function_node_from_line(Path::new("b.js"), 1, 0)
        .unwrap()
        .is_some());
}

#[test]
fn fragments_with_offset_first_lines_report_original_coordinates() {
    let mut engine = Engine::new(PathBuf::from("."), EngineOptions::default());
    // An inline script starting at line 40 of its page
    engine
        .append_source(Path::new("page.html"), 40, "function onClick() {\n  save();\n}\n")
        .unwrap();
    engine
        .append_source(Path::new("page.html"), 90, "function save() {}\n")
        .unwrap();
    engine.parse().unwrap();

    let save = seed_at(&engine, "page.html", 90, 0);
    let map = engine.get_async_stacks(save).unwrap();
    let edges = map
        .get(asyncscope::engine::propagate::AsyncSource::Function(save))
        .unwrap();
    let (path, line) = common::origin_of(&engine, edges[0].await_site.unwrap());
    assert_eq!((path.as_path(), line), (Path::new("page.html"), 41));
}

use asyncscope::engine::{Engine, EngineOptions};
use asyncscope::parser::ast::NodeId;
use std::path::{Path, PathBuf};

/// Builds a parsed engine from in-memory `(path, text)` fragments.
pub fn engine_from(files: &[(&str, &str)]) -> Engine {
    let mut engine = Engine::new(PathBuf::from("."), EngineOptions::default());
    for (path, text) in files {
        engine
            .append_source(Path::new(path), 1, text)
            .unwrap_or_else(|e| panic!("append {path}: {e}"));
    }
    engine.parse().expect("fixture should parse");
    engine
}

/// The `index`-th function on `line` of `path`; panics when absent.
pub fn seed_at(engine: &Engine, path: &str, line: u32, index: usize) -> NodeId {
    engine
        .function_node_from_line(Path::new(path), line, index)
        .expect("engine is parsed")
        .unwrap_or_else(|| panic!("no function at {path}:{line}[{index}]"))
}

/// Display name of a node, for assertions.
pub fn name_of(engine: &Engine, node: NodeId) -> String {
    engine
        .index()
        .expect("engine is parsed")
        .name_of(engine.ast().expect("engine is parsed"), node)
        .expect("node has a derived name")
}

/// Origin `(path, line)` of a node, for assertions.
pub fn origin_of(engine: &Engine, node: NodeId) -> (PathBuf, u32) {
    let index = engine.index().expect("engine is parsed");
    let (path, line) = index.origin(node);
    (path.to_path_buf(), line)
}

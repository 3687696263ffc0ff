use crate::engine::{Engine, EngineOptions};
use crate::error::{AsyncscopeError, Result};
use crate::html::HtmlExtractor;
use crate::report::{self, ReportModel, SerializerKind};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The JSON configuration document. Drives a full run: which extractor
/// feeds the buffer, which nodes to ignore, which function to seed, and
/// which serializer renders the result. Unknown keys are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    pub driver: DriverConfig,
    #[serde(default)]
    pub serializer: SerializerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    #[serde(rename = "type")]
    pub kind: DriverKind,
    /// Filesystem root for relative paths.
    pub root: PathBuf,
    /// Scripts to append, in order (javascript driver).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scripts: Vec<PathBuf>,
    /// HTML entry point (html driver).
    #[serde(rename = "pathToHTML", default, skip_serializing_if = "Option::is_none")]
    pub path_to_html: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore: Vec<IgnoreEntry>,
    #[serde(rename = "markAsync")]
    pub mark_async: MarkAsync,
    #[serde(default)]
    pub options: EngineOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    Javascript,
    Html,
}

/// A node to suppress, addressed by position and kind name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IgnoreEntry {
    pub path: PathBuf,
    pub line: u32,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub index: usize,
}

/// The seed function the user elects to make async.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkAsync {
    pub path: PathBuf,
    pub line: u32,
    #[serde(rename = "functionIndex", default)]
    pub function_index: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SerializerConfig {
    #[serde(rename = "type", default)]
    pub kind: SerializerKind,
    #[serde(default)]
    pub options: SerializerOptions,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SerializerOptions {
    /// Deduplicate await sites and order edges by (file, line).
    #[serde(default)]
    pub sorted: bool,
}

impl Configuration {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut text = serde_json::to_string_pretty(self)?;
        text.push('\n');
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Runs the whole pipeline this document describes and returns the
    /// rendered report.
    pub fn execute(&self) -> Result<String> {
        let mut engine = Engine::new(self.driver.root.clone(), self.driver.options.clone());

        match self.driver.kind {
            DriverKind::Javascript => {
                if self.driver.scripts.is_empty() {
                    return Err(AsyncscopeError::InvalidInput(
                        "javascript driver requires at least one script".to_string(),
                    ));
                }
                for script in &self.driver.scripts {
                    engine.append_file(script)?;
                }
            }
            DriverKind::Html => {
                let page = self.driver.path_to_html.as_ref().ok_or_else(|| {
                    AsyncscopeError::InvalidInput("html driver requires pathToHTML".to_string())
                })?;
                let mut extractor = HtmlExtractor::new();
                extractor.extract_into(&mut engine, page)?;
            }
        }

        engine.parse()?;

        for entry in &self.driver.ignore {
            let node = engine
                .node_by_line_kind_index(&entry.path, entry.line, &entry.kind, entry.index)?
                .ok_or_else(|| {
                    AsyncscopeError::NotFound(format!(
                        "ignore entry {}:{} {}[{}] matches no node",
                        entry.path.display(),
                        entry.line,
                        entry.kind,
                        entry.index
                    ))
                })?;
            engine.mark_ignored(node);
        }

        let mark = &self.driver.mark_async;
        let seed = engine
            .function_node_from_line(&mark.path, mark.line, mark.function_index)?
            .ok_or_else(|| {
                AsyncscopeError::NotFound(format!(
                    "no function at {}:{} index {}",
                    mark.path.display(),
                    mark.line,
                    mark.function_index
                ))
            })?;

        let mut report = ReportModel::new(&engine, seed)?;
        if self.serializer.options.sorted {
            report = report.with_sorted_edges();
        }
        report::render(&report, self.serializer.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_documented_shape() {
        let doc = r#"{
            "driver": {
                "type": "javascript",
                "root": "/tmp/project",
                "scripts": ["a.js", "b.js"],
                "ignore": [
                    {"path": "a.js", "line": 3, "type": "CallExpression", "index": 0}
                ],
                "markAsync": {"path": "b.js", "line": 1, "functionIndex": 0}
            },
            "serializer": {"type": "markdown", "options": {"sorted": true}}
        }"#;
        let cfg: Configuration = serde_json::from_str(doc).unwrap();
        assert_eq!(cfg.driver.kind, DriverKind::Javascript);
        assert_eq!(cfg.driver.scripts.len(), 2);
        assert_eq!(cfg.driver.ignore[0].kind, "CallExpression");
        assert_eq!(cfg.driver.mark_async.line, 1);
        assert_eq!(cfg.serializer.kind, SerializerKind::Markdown);
        assert!(cfg.serializer.options.sorted);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let doc = r#"{
            "driver": {
                "type": "javascript",
                "root": ".",
                "scripts": ["a.js"],
                "markAsync": {"path": "a.js", "line": 1},
                "futureKnob": 42
            },
            "reporting": {"legacy": true}
        }"#;
        let cfg: Configuration = serde_json::from_str(doc).unwrap();
        assert_eq!(cfg.driver.mark_async.function_index, 0);
        assert_eq!(cfg.serializer.kind, SerializerKind::Text);
    }

    #[test]
    fn round_trips_through_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Configuration {
            driver: DriverConfig {
                kind: DriverKind::Javascript,
                root: PathBuf::from("."),
                scripts: vec![PathBuf::from("a.js")],
                path_to_html: None,
                ignore: Vec::new(),
                mark_async: MarkAsync {
                    path: PathBuf::from("a.js"),
                    line: 2,
                    function_index: 1,
                },
                options: EngineOptions::default(),
            },
            serializer: SerializerConfig::default(),
        };
        let path = dir.path().join("config.json");
        cfg.save(&path).unwrap();
        let loaded = Configuration::load(&path).unwrap();
        assert_eq!(loaded.driver.mark_async.line, 2);
        assert_eq!(loaded.driver.mark_async.function_index, 1);
    }
}

use crate::engine::Engine;
use crate::error::{AsyncscopeError, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tree_sitter::{Node as TsNode, Parser};

/// Feeds an HTML page's scripts into the engine's source buffer:
/// `<script src=...>` appends the referenced file, inline `<script>` bodies
/// append in place with their original line numbers, in document order so
/// derived indices are reproducible across runs.
pub struct HtmlExtractor {
    seen: HashSet<PathBuf>,
}

enum Script {
    External(String),
    Inline { first_line: u32, text: String },
}

impl Default for HtmlExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl HtmlExtractor {
    pub fn new() -> Self {
        Self {
            seen: HashSet::new(),
        }
    }

    pub fn extract_into(&mut self, engine: &mut Engine, page: &Path) -> Result<()> {
        if !self.seen.insert(page.to_path_buf()) {
            return Err(AsyncscopeError::DuplicateHandle(page.to_path_buf()));
        }
        let resolved = engine.buffer().resolve(page)?;
        let html = std::fs::read_to_string(&resolved)?;

        let mut parser = Parser::new();
        let language: tree_sitter::Language = tree_sitter_html::LANGUAGE.into();
        parser
            .set_language(&language)
            .map_err(|e| AsyncscopeError::Syntax(e.to_string()))?;
        let tree = parser.parse(&html, None).ok_or_else(|| {
            AsyncscopeError::Syntax(format!("failed to parse {}", page.display()))
        })?;

        let mut scripts = Vec::new();
        collect_scripts(tree.root_node(), &html, &mut scripts);
        tracing::info!(page = %page.display(), scripts = scripts.len(), "extracted scripts");

        let base = page.parent().unwrap_or(Path::new(""));
        for script in scripts {
            match script {
                Script::External(src) => {
                    if src.starts_with("http:") || src.starts_with("https:") || src.starts_with("//")
                    {
                        tracing::warn!(src = %src, "dropping remote script on the floor");
                        continue;
                    }
                    engine.append_file(&base.join(src))?;
                }
                Script::Inline { first_line, text } => {
                    if !text.trim().is_empty() {
                        engine.append_source(page, first_line, &text)?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn collect_scripts(node: TsNode, html: &str, out: &mut Vec<Script>) {
    let mut cursor = node.walk();
    if node.kind() == "script_element" {
        if let Some(src) = script_src(node, html) {
            out.push(Script::External(src));
        } else {
            for child in node.named_children(&mut cursor) {
                if child.kind() == "raw_text" {
                    out.push(Script::Inline {
                        first_line: child.start_position().row as u32 + 1,
                        text: child.utf8_text(html.as_bytes()).unwrap_or_default().to_string(),
                    });
                }
            }
        }
        return;
    }
    let children: Vec<_> = node.named_children(&mut cursor).collect();
    for child in children {
        collect_scripts(child, html, out);
    }
}

fn script_src(script: TsNode, html: &str) -> Option<String> {
    let mut cursor = script.walk();
    let start_tag = script
        .named_children(&mut cursor)
        .find(|c| c.kind() == "start_tag")?;
    let mut tag_cursor = start_tag.walk();
    for attr in start_tag.named_children(&mut tag_cursor) {
        if attr.kind() != "attribute" {
            continue;
        }
        let mut attr_cursor = attr.walk();
        let mut name = None;
        let mut value = None;
        for part in attr.named_children(&mut attr_cursor) {
            match part.kind() {
                "attribute_name" => {
                    name = Some(part.utf8_text(html.as_bytes()).unwrap_or_default());
                }
                "quoted_attribute_value" => {
                    let mut quote_cursor = part.walk();
                    value = part
                        .named_children(&mut quote_cursor)
                        .find(|v| v.kind() == "attribute_value")
                        .map(|v| v.utf8_text(html.as_bytes()).unwrap_or_default().to_string());
                }
                "attribute_value" => {
                    value = Some(part.utf8_text(html.as_bytes()).unwrap_or_default().to_string());
                }
                _ => {}
            }
        }
        if name == Some("src") {
            return value;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineOptions;

    #[test]
    fn extracts_inline_and_external_scripts_in_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lib.js"), "function fromFile() {}\n").unwrap();
        std::fs::write(
            dir.path().join("page.html"),
            "<html>\n<head>\n<script src=\"lib.js\"></script>\n</head>\n<body>\n<script>\nfunction inline() { fromFile(); }\n</script>\n</body>\n</html>\n",
        )
        .unwrap();

        let mut engine = Engine::new(dir.path().to_path_buf(), EngineOptions::default());
        let mut extractor = HtmlExtractor::new();
        extractor
            .extract_into(&mut engine, Path::new("page.html"))
            .unwrap();
        engine.parse().unwrap();

        // External script keeps its own path, inline code reports the page
        // with its original line numbers
        assert!(engine
            .function_node_from_line(Path::new("lib.js"), 1, 0)
            .unwrap()
            .is_some());
        assert!(engine
            .function_node_from_line(Path::new("page.html"), 7, 0)
            .unwrap()
            .is_some());
    }

    #[test]
    fn same_page_twice_is_a_duplicate_handle() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("page.html"),
            "<html><body><script>function f() {}</script></body></html>\n",
        )
        .unwrap();

        let mut engine = Engine::new(dir.path().to_path_buf(), EngineOptions::default());
        let mut extractor = HtmlExtractor::new();
        extractor
            .extract_into(&mut engine, Path::new("page.html"))
            .unwrap();
        assert!(matches!(
            extractor.extract_into(&mut engine, Path::new("page.html")),
            Err(AsyncscopeError::DuplicateHandle(_))
        ));
    }

    #[test]
    fn remote_scripts_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("page.html"),
            "<html><body><script src=\"https://cdn.example/x.js\"></script>\n<script>function local() {}</script></body></html>\n",
        )
        .unwrap();

        let mut engine = Engine::new(dir.path().to_path_buf(), EngineOptions::default());
        let mut extractor = HtmlExtractor::new();
        extractor
            .extract_into(&mut engine, Path::new("page.html"))
            .unwrap();
        engine.parse().unwrap();
        assert!(engine
            .function_node_from_line(Path::new("page.html"), 2, 0)
            .unwrap()
            .is_some());
    }
}

use super::ReportModel;
use crate::engine::propagate::{AsyncSource, Marking};
use crate::error::Result;

/// The same data as the text serializer, as nested Markdown lists.
pub fn write_markdown(report: &ReportModel) -> Result<String> {
    let mut out = String::new();
    let seed = report.seed();
    out.push_str("# Async propagation report\n\n");
    out.push_str(&format!(
        "Seed: `{}` at `{}`\n",
        report.name_of(seed)?,
        report.serialize_node(seed)
    ));
    if report.is_async_syntax_error(seed) {
        out.push_str(&format!(
            "\n> **SyntaxError**: `async` is illegal on `{}`{}\n",
            report.name_of(seed)?,
            report.annotation(seed)
        ));
    }

    for (source, edges) in report.async_map().iter() {
        let AsyncSource::Function(function) = source else {
            continue;
        };
        out.push_str(&format!(
            "\n## `{}`{} at `{}`\n\n",
            report.name_of(function)?,
            report.annotation(function),
            report.serialize_node(function)
        ));
        if report.is_async_syntax_error(function) {
            out.push_str(&format!(
                "> **SyntaxError**: `async` is illegal on `{}`{}\n\n",
                report.name_of(function)?,
                report.annotation(function)
            ));
        }
        if edges.is_empty() {
            out.push_str("- (no await sites)\n");
        }
        for edge in edges {
            let Some(site) = edge.await_site else {
                continue;
            };
            let suffix = match edge.marking {
                Marking::Function(parent) => format!("marks `{}`", report.name_of(parent)?),
                Marking::AlreadyAsync(parent) => {
                    format!("`{}` is already async", report.name_of(parent)?)
                }
                Marking::None => "top level".to_string(),
            };
            out.push_str(&format!(
                "- await `{}` (`{}`) -> {}\n",
                report.serialize_node(site),
                report.name_of(site)?,
                suffix
            ));
        }
    }

    let tail = report.marked_without_entry();
    if !tail.is_empty() {
        out.push_str("\n## Also marked async\n\n");
        for function in tail {
            out.push_str(&format!(
                "- `{}`{} at `{}`\n",
                report.name_of(function)?,
                report.annotation(function),
                report.serialize_node(function)
            ));
        }
    }

    Ok(out)
}

use super::ReportModel;
use crate::engine::propagate::{AsyncSource, Marking};
use crate::error::Result;

/// The plain-text callstack dump. One block per async function in
/// propagation order; every await site names the function it marks.
/// Constructors and accessors get a `SyntaxError:` diagnostic, since
/// JavaScript forbids marking them async.
pub fn write_text(report: &ReportModel) -> Result<String> {
    let mut out = String::new();
    let seed = report.seed();
    out.push_str(&format!(
        "seed \"{}\" ({})\n",
        report.name_of(seed)?,
        report.serialize_node(seed)
    ));
    if report.is_async_syntax_error(seed) {
        out.push_str(&syntax_error_line(report, seed)?);
    }

    for (source, edges) in report.async_map().iter() {
        let AsyncSource::Function(function) = source else {
            continue;
        };
        out.push('\n');
        out.push_str(&format!(
            "async {}{} \"{}\" ({})\n",
            report.ast_kind_name(function),
            report.annotation(function),
            report.name_of(function)?,
            report.serialize_node(function)
        ));
        if report.is_async_syntax_error(function) {
            out.push_str(&syntax_error_line(report, function)?);
        }
        for edge in edges {
            let Some(site) = edge.await_site else {
                continue;
            };
            let suffix = match edge.marking {
                Marking::Function(parent) => {
                    format!(" -> marks \"{}\"", report.name_of(parent)?)
                }
                Marking::AlreadyAsync(parent) => {
                    format!(" -> \"{}\" already async", report.name_of(parent)?)
                }
                Marking::None => " -> top level".to_string(),
            };
            out.push_str(&format!(
                "  await {} \"{}\"{}\n",
                report.serialize_node(site),
                report.name_of(site)?,
                suffix
            ));
        }
    }

    let tail = report.marked_without_entry();
    if !tail.is_empty() {
        out.push_str("\nalso marked async:\n");
        for function in tail {
            out.push_str(&format!(
                "  {}{} \"{}\" ({})\n",
                report.ast_kind_name(function),
                report.annotation(function),
                report.name_of(function)?,
                report.serialize_node(function)
            ));
            if report.is_async_syntax_error(function) {
                out.push_str("  ");
                out.push_str(&syntax_error_line(report, function)?);
            }
        }
    }

    Ok(out)
}

fn syntax_error_line(report: &ReportModel, node: crate::parser::ast::NodeId) -> Result<String> {
    Ok(format!(
        "  SyntaxError: async {}{} \"{}\"\n",
        report.ast_kind_name(node),
        report.annotation(node),
        report.name_of(node)?
    ))
}

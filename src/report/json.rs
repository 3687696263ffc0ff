use super::ReportModel;
use crate::engine::propagate::{AsyncSource, Marking};
use crate::error::Result;
use crate::parser::ast::NodeId;
use serde::Serialize;

#[derive(Serialize)]
struct JsonNode {
    name: String,
    kind: String,
    location: String,
    #[serde(rename = "syntaxError", skip_serializing_if = "std::ops::Not::not")]
    syntax_error: bool,
}

#[derive(Serialize)]
struct JsonAwait {
    site: JsonNode,
    #[serde(skip_serializing_if = "Option::is_none")]
    marks: Option<JsonNode>,
    #[serde(rename = "alreadyAsync", skip_serializing_if = "std::ops::Not::not")]
    already_async: bool,
}

#[derive(Serialize)]
struct JsonEntry {
    function: JsonNode,
    awaits: Vec<JsonAwait>,
}

#[derive(Serialize)]
struct JsonReport {
    seed: JsonNode,
    functions: Vec<JsonEntry>,
    #[serde(rename = "alsoMarked")]
    also_marked: Vec<JsonNode>,
}

fn json_node(report: &ReportModel, node: NodeId) -> Result<JsonNode> {
    Ok(JsonNode {
        name: report.name_of(node)?,
        kind: report.ast_kind_name(node).to_string(),
        location: report.serialize_node(node),
        syntax_error: report.is_async_syntax_error(node),
    })
}

pub fn write_json(report: &ReportModel) -> Result<String> {
    let mut functions = Vec::new();
    for (source, edges) in report.async_map().iter() {
        let AsyncSource::Function(function) = source else {
            continue;
        };
        let mut awaits = Vec::new();
        for edge in edges {
            let Some(site) = edge.await_site else {
                continue;
            };
            let (marks, already_async) = match edge.marking {
                Marking::Function(parent) => (Some(json_node(report, parent)?), false),
                Marking::AlreadyAsync(parent) => (Some(json_node(report, parent)?), true),
                Marking::None => (None, false),
            };
            awaits.push(JsonAwait {
                site: json_node(report, site)?,
                marks,
                already_async,
            });
        }
        functions.push(JsonEntry {
            function: json_node(report, function)?,
            awaits,
        });
    }

    let also_marked = report
        .marked_without_entry()
        .into_iter()
        .map(|f| json_node(report, f))
        .collect::<Result<Vec<_>>>()?;

    let doc = JsonReport {
        seed: json_node(report, report.seed())?,
        functions,
        also_marked,
    };
    Ok(serde_json::to_string_pretty(&doc)?)
}

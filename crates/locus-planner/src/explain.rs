//! Indented text rendering of a derived plan.

use std::fmt::Write;

use locus_core::error::Result;

use crate::physical::PhysicalNode;

#[derive(Debug, Clone, Copy, Default)]
pub struct ExplainOptions {
    /// Prefix each line with the node id.
    pub ids: bool,
    /// Append the output column names.
    pub columns: bool,
}

pub fn explain(root: &PhysicalNode) -> String {
    explain_with(root, ExplainOptions::default())
}

pub fn explain_with(root: &PhysicalNode, opts: ExplainOptions) -> String {
    let mut out = String::new();
    render(root, 0, opts, &mut out);
    out
}

/// The whole tree as pretty-printed JSON, for tooling that diffs plans.
pub fn explain_json(root: &PhysicalNode) -> Result<String> {
    Ok(serde_json::to_string_pretty(root)?)
}

fn render(node: &PhysicalNode, depth: usize, opts: ExplainOptions, out: &mut String) {
    let indent = "  ".repeat(depth);
    let id = if opts.ids {
        format!("#{} ", node.id.get())
    } else {
        String::new()
    };
    // Writing into a String cannot fail.
    let _ = write!(
        out,
        "{indent}{id}{}  [{} @ {}]",
        node.op.label(),
        node.distribution,
        node.location
    );
    if opts.columns {
        let _ = write!(out, " ({})", node.schema.names().join(", "));
    }
    out.push('\n');
    for input in &node.inputs {
        render(input, depth + 1, opts, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::Distribution;
    use crate::location::Location;
    use crate::physical::PhysicalOp;
    use locus_core::id::NodeId;
    use locus_core::schema::{DataType, Field, Schema};
    use std::sync::Arc;

    #[test]
    fn renders_tree() {
        let coord = Arc::new(Location::new("coord", 1).as_single());
        let leaf = PhysicalNode {
            id: NodeId::new(0),
            op: PhysicalOp::Values { rows: 2 },
            inputs: vec![],
            schema: Schema::new(vec![Field::new("a", DataType::Int64, false)]),
            distribution: Distribution::singleton(),
            location: Arc::clone(&coord),
        };
        let root = PhysicalNode {
            id: NodeId::new(1),
            op: PhysicalOp::Sink {
                target: locus_core::dag::SinkTarget::Client,
            },
            schema: leaf.schema.clone(),
            inputs: vec![leaf],
            distribution: Distribution::singleton(),
            location: coord,
        };
        let text = explain_with(
            &root,
            ExplainOptions {
                ids: true,
                columns: true,
            },
        );
        assert_eq!(
            text,
            "#1 Sink client  [Singleton @ coord(1)] (a)\n  #0 Values rows=2  [Singleton @ coord(1)] (a)\n"
        );

        let json: serde_json::Value = serde_json::from_str(&explain_json(&root).unwrap()).unwrap();
        assert_eq!(json["location"]["name"], "coord");
        assert_eq!(json["inputs"][0]["op"]["Values"]["rows"], 2);
    }
}

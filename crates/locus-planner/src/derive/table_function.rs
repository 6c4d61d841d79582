use locus_core::dag::TableFunctionMode;
use locus_core::error::{Error, Result};
use locus_core::schema::{DataType, Schema};
use locus_core::types::Expr;

use super::{Derived, Deriver};
use crate::distribution::Distribution;
use crate::fields::project_distribution;
use crate::physical::{PhysicalNode, PhysicalOp};

/// Output columns as expressions over the input: pass-through columns are
/// plain references, everything else is produced by the function.
fn output_exprs(name: &str, schema: &Schema, pass_through: &[String]) -> Vec<(Expr, String)> {
    schema
        .fields
        .iter()
        .map(|f| {
            let source = if pass_through.contains(&f.name) {
                Expr::col(f.name.clone())
            } else {
                Expr::Call {
                    func: name.to_string(),
                    args: Vec::new(),
                    return_type: DataType::Utf8,
                }
            };
            (source, f.name.clone())
        })
        .collect()
}

impl Deriver<'_> {
    pub(super) fn derive_table_function(
        &mut self,
        name: &str,
        args: &[Expr],
        input: Option<Derived>,
        schema: &Schema,
        mode: TableFunctionMode,
        pass_through: &[String],
    ) -> Result<Derived> {
        let op = PhysicalOp::TableFunction {
            name: name.to_string(),
            args: args.to_vec(),
            mode,
        };

        let Some(input) = input else {
            let single = self.single_location()?;
            return Ok(Derived::Node(self.node(
                op,
                Vec::new(),
                schema.clone(),
                Distribution::singleton(),
                single,
            )));
        };

        for col in pass_through {
            input.schema().require(col)?;
            if schema.index_of(col).is_none() {
                return Err(Error::Schema(format!(
                    "table function '{name}' passes '{col}' through but does not output it"
                )));
            }
        }
        let exprs = output_exprs(name, schema, pass_through);

        match (mode, input) {
            (TableFunctionMode::PerPartition, Derived::Node(node)) => {
                Ok(Derived::Node(self.per_partition(op, node, schema, &exprs)))
            }
            (TableFunctionMode::PerPartition, Derived::Pending(pending)) => {
                let out_schema = schema.clone();
                let mapped = pending.map_groups(&mut self.ids, schema.clone(), |ids, node| {
                    Ok(PhysicalNode {
                        id: ids.next_id(),
                        op: op.clone(),
                        schema: out_schema.clone(),
                        distribution: project_distribution(&node.distribution, &exprs),
                        location: node.location.clone(),
                        inputs: vec![node],
                    })
                })?;
                Ok(self.settle(mapped))
            }
            (TableFunctionMode::Singleton, input) => {
                let single = self.single_location()?;
                let node = match input {
                    Derived::Node(n) => self.gather(n, &single),
                    Derived::Pending(p) => self.resolve_gathered(p, &single)?,
                };
                let dist = project_distribution(&node.distribution, &exprs);
                let location = node.location.clone();
                Ok(Derived::Node(self.node(
                    op,
                    vec![node],
                    schema.clone(),
                    dist,
                    location,
                )))
            }
        }
    }

    fn per_partition(
        &mut self,
        op: PhysicalOp,
        node: PhysicalNode,
        schema: &Schema,
        exprs: &[(Expr, String)],
    ) -> PhysicalNode {
        let dist = project_distribution(&node.distribution, exprs);
        let location = node.location.clone();
        self.node(op, vec![node], schema.clone(), dist, location)
    }
}

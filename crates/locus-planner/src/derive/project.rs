use locus_core::dag::project_schema;
use locus_core::error::Result;
use locus_core::types::Expr;

use super::{Derived, Deriver};
use crate::fields::{filter_distribution, project_distribution};
use crate::physical::{PhysicalNode, PhysicalOp};

impl Deriver<'_> {
    pub(super) fn derive_filter(&mut self, input: Derived, predicate: &Expr) -> Result<Derived> {
        for col in predicate.columns() {
            input.schema().require(col)?;
        }
        match input {
            Derived::Node(node) => Ok(Derived::Node(self.filter_node(node, predicate))),
            Derived::Pending(pending) => {
                let schema = pending.schema.clone();
                let mapped = pending.map_groups(&mut self.ids, schema, |ids, node| {
                    Ok(PhysicalNode {
                        id: ids.next_id(),
                        op: PhysicalOp::Filter {
                            predicate: predicate.clone(),
                        },
                        schema: node.schema.clone(),
                        distribution: filter_distribution(&node.distribution, predicate),
                        location: node.location.clone(),
                        inputs: vec![node],
                    })
                })?;
                Ok(self.settle(mapped))
            }
        }
    }

    fn filter_node(&mut self, input: PhysicalNode, predicate: &Expr) -> PhysicalNode {
        let dist = filter_distribution(&input.distribution, predicate);
        let schema = input.schema.clone();
        let location = input.location.clone();
        self.node(
            PhysicalOp::Filter {
                predicate: predicate.clone(),
            },
            vec![input],
            schema,
            dist,
            location,
        )
    }

    pub(super) fn derive_project(
        &mut self,
        input: Derived,
        exprs: &[(Expr, String)],
    ) -> Result<Derived> {
        let schema = project_schema(input.schema(), exprs)?;
        match input {
            Derived::Node(node) => {
                let dist = project_distribution(&node.distribution, exprs);
                let location = node.location.clone();
                Ok(Derived::Node(self.node(
                    PhysicalOp::Project {
                        exprs: exprs.to_vec(),
                    },
                    vec![node],
                    schema,
                    dist,
                    location,
                )))
            }
            // Runs per group; groups may merge once keys are projected away.
            Derived::Pending(pending) => {
                let out_schema = schema.clone();
                let mapped = pending.map_groups(&mut self.ids, schema, |ids, node| {
                    Ok(PhysicalNode {
                        id: ids.next_id(),
                        op: PhysicalOp::Project {
                            exprs: exprs.to_vec(),
                        },
                        schema: out_schema.clone(),
                        distribution: project_distribution(&node.distribution, exprs),
                        location: node.location.clone(),
                        inputs: vec![node],
                    })
                })?;
                Ok(self.settle(mapped))
            }
        }
    }
}

//! Dependency graph over declared resources.
//!
//! Edges run from a dependency to its dependent. They come from `Ref` and
//! `Fn::GetAtt` intrinsics found anywhere in a resource's properties and
//! from explicit `DependsOn` entries.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde_json::Value;

use crate::id::LogicalId;
use crate::template::ResourceEntry;
use crate::{Error, Result};

pub struct DependencyGraph {
    graph: DiGraph<LogicalId, ()>,
    nodes: BTreeMap<LogicalId, NodeIndex>,
}

impl DependencyGraph {
    /// Build the graph, failing on references to undeclared resources and on cycles.
    pub fn from_resources(resources: &BTreeMap<LogicalId, ResourceEntry>) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut nodes = BTreeMap::new();

        for id in resources.keys() {
            let idx = graph.add_node(id.clone());
            nodes.insert(id.clone(), idx);
        }

        for (id, entry) in resources {
            let dependent_idx = nodes[id];
            for dep in dependencies(entry) {
                let Some(&dep_idx) = nodes.get(&dep) else {
                    return Err(Error::UnresolvedReference {
                        from: id.to_string(),
                        to: dep.to_string(),
                    });
                };
                graph.update_edge(dep_idx, dependent_idx, ());
            }
        }

        let dag = Self { graph, nodes };
        dag.creation_order()?;
        Ok(dag)
    }

    /// Resources in an order where every dependency precedes its dependents.
    pub fn creation_order(&self) -> Result<Vec<LogicalId>> {
        let sorted = toposort(&self.graph, None).map_err(|cycle| {
            Error::CycleDetected(format!("{} depends on itself", self.graph[cycle.node_id()]))
        })?;
        Ok(sorted.into_iter().map(|idx| self.graph[idx].clone()).collect())
    }

    /// Resources grouped into waves that can be created in parallel; each
    /// wave depends only on earlier waves.
    pub fn waves(&self) -> Result<Vec<Vec<LogicalId>>> {
        let mut in_degree: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|idx| {
                let degree = self
                    .graph
                    .neighbors_directed(idx, Direction::Incoming)
                    .count();
                (idx, degree)
            })
            .collect();

        let mut remaining: BTreeSet<&LogicalId> = self.nodes.keys().collect();
        let mut waves = Vec::new();

        while !remaining.is_empty() {
            let ready: Vec<LogicalId> = remaining
                .iter()
                .filter(|id| in_degree[&self.nodes[**id]] == 0)
                .map(|id| (*id).clone())
                .collect();

            if ready.is_empty() {
                return Err(Error::CycleDetected(format!(
                    "no resource in {:?} can be created first",
                    remaining
                )));
            }

            for id in &ready {
                remaining.remove(id);
                for dependent in self
                    .graph
                    .neighbors_directed(self.nodes[id], Direction::Outgoing)
                {
                    if let Some(degree) = in_degree.get_mut(&dependent) {
                        *degree = degree.saturating_sub(1);
                    }
                }
            }

            waves.push(ready);
        }

        Ok(waves)
    }

    /// Direct dependencies of a resource, ordered by logical id.
    pub fn dependencies_of(&self, id: &LogicalId) -> Vec<LogicalId> {
        let Some(&idx) = self.nodes.get(id) else {
            return Vec::new();
        };

        let mut deps: Vec<LogicalId> = self
            .graph
            .neighbors_directed(idx, Direction::Incoming)
            .map(|dep| self.graph[dep].clone())
            .collect();
        deps.sort();
        deps
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Every logical id a resource depends on.
pub fn dependencies(entry: &ResourceEntry) -> BTreeSet<LogicalId> {
    let mut out = BTreeSet::new();
    collect_references(&entry.properties, &mut out);
    out.extend(entry.depends_on.iter().cloned());
    out
}

fn collect_references(value: &Value, out: &mut BTreeSet<LogicalId>) {
    match value {
        Value::Object(map) => {
            if map.len() == 1 {
                if let Some(Value::String(target)) = map.get("Ref") {
                    if !target.starts_with("AWS::") {
                        out.insert(LogicalId::from_raw(target.as_str()));
                    }
                    return;
                }
                if let Some(Value::Array(args)) = map.get("Fn::GetAtt") {
                    if let Some(Value::String(target)) = args.first() {
                        out.insert(LogicalId::from_raw(target.as_str()));
                    }
                    return;
                }
            }
            for v in map.values() {
                collect_references(v, out);
            }
        }
        Value::Array(items) => {
            for v in items {
                collect_references(v, out);
            }
        }
        _ => {}
    }
}

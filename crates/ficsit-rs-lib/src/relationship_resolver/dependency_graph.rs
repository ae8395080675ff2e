//! Module for only DependencyGraph functions not related to the catalog lookups.

use std::collections::HashMap;

use petgraph::prelude::*;
use petgraph::visit::DfsPostOrder;

use super::ResolvedMod;

/// Edges point from a mod to each of its dependencies.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
	graph: DiGraph<String, ()>,
	nodes: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
	/// Builds the graph of resolved mods. Dependencies that failed to resolve have no node.
	pub fn from_resolved(entries: &HashMap<String, ResolvedMod>) -> Self {
		let mut ids: Vec<&String> = entries.keys().collect();
		ids.sort();

		let mut g = Self::default();
		for id in &ids {
			let index = g.graph.add_node((*id).clone());
			g.nodes.insert((*id).clone(), index);
		}
		for id in &ids {
			let from = g.nodes[*id];
			for dep in &entries[*id].dependencies {
				if let Some(&to) = g.nodes.get(dep) {
					if to != from && !g.graph.contains_edge(from, to) {
						g.graph.add_edge(from, to, ());
					}
				}
			}
		}
		g
	}

	pub fn has_cycle(&self) -> bool {
		petgraph::algo::is_cyclic_directed(&self.graph)
	}

	/// Gets the install order.
	///
	/// A post-order walk from each root in turn, so every mod comes after everything it depends on.
	/// Mods on a cycle are still emitted once each, in the order the walk finishes them.
	/// Finally the `mandatory` mods are moved to the front in the order given.
	pub fn install_order(&self, roots: &[String], mandatory: &[String]) -> Vec<String> {
		if self.has_cycle() {
			log::warn!("Dependency cycle detected, order within the cycle is arbitrary.");
		}

		let mut dfs = DfsPostOrder::empty(&self.graph);
		let mut order = Vec::<String>::with_capacity(self.graph.node_count());

		let starts = roots.iter()
			.filter_map(|r| self.nodes.get(r).copied())
			.chain(self.graph.node_indices());
		for start in starts {
			dfs.move_to(start);
			while let Some(n) = dfs.next(&self.graph) {
				order.push(self.graph[n].clone());
			}
		}

		let mut front = Vec::<String>::new();
		for m in mandatory {
			if order.contains(m) && !front.contains(m) {
				front.push(m.clone());
			}
		}
		order.retain(|id| !front.contains(id));
		front.extend(order);
		front
	}
}

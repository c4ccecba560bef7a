//! Dependency ordering of concrete definitions.
//!
//! [`order`] turns a definition set into [`OrderGroup`]s whose concatenation
//! is a topological order of the set's dependency graph, with every strongly
//! connected component merged into one group. Dependencies outside the set
//! are only looked up in the store: a missing or unfinished result produces
//! a forward-reference warning, a blacklisted one holds the dependent back.

mod graph;

use std::borrow::Borrow;
use std::collections::BTreeSet;

use lemma_core::{
	ConcreteDefinition, DefinitionId, DefinitionStore, Diagnostic, DiagnosticOrigin, MessageKey, Severity, TypecheckStatus,
};
use smallvec::SmallVec;

pub use crate::graph::DependencyGraph;

/// Definitions typechecked together; more than one member only for mutual recursion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderGroup {
	/// In source order.
	pub members: SmallVec<[DefinitionId; 2]>,
	/// Mutually recursive members or a self-reference.
	pub recursive: bool,
}

impl OrderGroup {
	pub fn single(id: DefinitionId) -> Self {
		Self {
			members: smallvec::smallvec![id],
			recursive: false,
		}
	}

	pub fn contains(&self, id: DefinitionId) -> bool {
		self.members.contains(&id)
	}

	pub fn len(&self) -> usize {
		self.members.len()
	}

	pub fn is_empty(&self) -> bool {
		self.members.is_empty()
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ordering {
	pub groups: Vec<OrderGroup>,
	/// Cycle errors and forward-reference warnings, per definition.
	pub diagnostics: Vec<Diagnostic>,
	/// Members that depend, directly or through the set, on a blacklisted definition.
	pub held: Vec<DefinitionId>,
	/// Number of leading groups that make up the priority's dependency closure.
	pub priority_groups: usize,
}

impl Ordering {
	/// Index of the group containing `id`.
	pub fn position(&self, id: DefinitionId) -> Option<usize> {
		self.groups.iter().position(|g| g.contains(id))
	}

	pub fn ids(&self) -> impl Iterator<Item = DefinitionId> + '_ {
		self.groups.iter().flat_map(|g| g.members.iter().copied())
	}

	pub fn is_held(&self, id: DefinitionId) -> bool {
		self.held.contains(&id)
	}

	pub fn into_phases(mut self) -> PhasedOrdering {
		let rest = self.groups.split_off(self.priority_groups.min(self.groups.len()));
		PhasedOrdering {
			priority: self.groups,
			rest,
			diagnostics: self.diagnostics,
			held: self.held,
		}
	}
}

/// An [`Ordering`] split into the priority phase and everything after it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhasedOrdering {
	/// The priority and its in-set dependency closure; empty without a priority.
	pub priority: Vec<OrderGroup>,
	pub rest: Vec<OrderGroup>,
	pub diagnostics: Vec<Diagnostic>,
	pub held: Vec<DefinitionId>,
}

/// Orders `definitions`, emitting `priority`'s group as early as topological
/// order allows.
pub fn order<D: Borrow<ConcreteDefinition>>(definitions: &[D], priority: Option<DefinitionId>, store: &DefinitionStore) -> Ordering {
	order_graph(&DependencyGraph::build(definitions), priority, store)
}

pub fn order_phased<D: Borrow<ConcreteDefinition>>(
	definitions: &[D],
	priority: Option<DefinitionId>,
	store: &DefinitionStore,
) -> PhasedOrdering {
	order(definitions, priority, store).into_phases()
}

pub fn order_graph(graph: &DependencyGraph, priority: Option<DefinitionId>, store: &DefinitionStore) -> Ordering {
	let components = graph.components();
	let mut component_of = vec![0; graph.len()];
	for (c, members) in components.iter().enumerate() {
		for member in members {
			component_of[*member] = c;
		}
	}

	let mut component_deps: Vec<SmallVec<[usize; 4]>> = vec![SmallVec::new(); components.len()];
	let mut component_dependents: Vec<SmallVec<[usize; 4]>> = vec![SmallVec::new(); components.len()];
	let mut remaining = vec![0usize; components.len()];
	for (v, node) in graph.nodes.iter().enumerate() {
		let cv = component_of[v];
		for (w, _) in &node.deps {
			let cw = component_of[*w];
			if cw != cv && !component_deps[cv].contains(&cw) {
				component_deps[cv].push(cw);
				component_dependents[cw].push(cv);
				remaining[cv] += 1;
			}
		}
	}

	let mut in_closure = vec![false; components.len()];
	match priority.map(|p| (p, graph.position(p))) {
		Some((_, Some(position))) => {
			let mut stack = vec![component_of[position]];
			while let Some(c) = stack.pop() {
				if !std::mem::replace(&mut in_closure[c], true) {
					stack.extend(component_deps[c].iter().copied());
				}
			}
		}
		Some((id, None)) => tracing::debug!(def = ?id, "order.priority_not_in_set"),
		None => {}
	}

	// Ready components keyed by their first member's position.
	let mut ready_first = BTreeSet::new();
	let mut ready_rest = BTreeSet::new();
	for (c, members) in components.iter().enumerate() {
		if remaining[c] == 0 {
			let ready = if in_closure[c] { &mut ready_first } else { &mut ready_rest };
			ready.insert((members[0], c));
		}
	}

	let mut ordering = Ordering::default();
	loop {
		let (from_closure, c) = match ready_first.pop_first() {
			Some((_, c)) => (true, c),
			None => match ready_rest.pop_first() {
				Some((_, c)) => (false, c),
				None => break,
			},
		};
		if from_closure {
			ordering.priority_groups += 1;
		}
		for dependent in &component_dependents[c] {
			remaining[*dependent] -= 1;
			if remaining[*dependent] == 0 {
				let ready = if in_closure[*dependent] { &mut ready_first } else { &mut ready_rest };
				ready.insert((components[*dependent][0], *dependent));
			}
		}

		let members = &components[c];
		let recursive = members.len() > 1 || graph.has_self_loop(members[0]);
		if recursive && graph.has_header_cycle(members) {
			for member in members {
				let node = &graph.nodes[*member];
				ordering.diagnostics.push(Diagnostic::on_definition(
					node.file,
					node.id,
					Severity::Error,
					MessageKey::CyclicTypeDependency,
					DiagnosticOrigin::Orderer,
				));
			}
		}
		ordering.groups.push(OrderGroup {
			members: members.iter().map(|m| graph.nodes[*m].id).collect(),
			recursive,
		});
	}

	ordering.held = outside_dependencies(graph, store, &mut ordering.diagnostics);

	tracing::debug!(
		definitions = graph.len(),
		groups = ordering.groups.len(),
		priority_groups = ordering.priority_groups,
		held = ordering.held.len(),
		diagnostics = ordering.diagnostics.len(),
		"order"
	);
	ordering
}

/// Checks dependencies leaving the set against the store and returns the
/// held members in position order.
fn outside_dependencies(graph: &DependencyGraph, store: &DefinitionStore, diagnostics: &mut Vec<Diagnostic>) -> Vec<DefinitionId> {
	let mut held = vec![false; graph.len()];
	for (v, node) in graph.nodes.iter().enumerate() {
		for dependency in &node.outside {
			match store.status(dependency.target) {
				Some(TypecheckStatus::Blacklisted) => held[v] = true,
				Some(status) if status.is_final() => {}
				_ => {
					let target = store.path(dependency.target).map_or_else(|| format!("{:?}", dependency.target), |p| p.to_string());
					diagnostics.push(
						Diagnostic::on_definition(node.file, node.id, Severity::Warning, MessageKey::ForwardReference, DiagnosticOrigin::Orderer)
							.with_arg(target),
					);
				}
			}
		}
	}

	let mut dependents: Vec<SmallVec<[usize; 4]>> = vec![SmallVec::new(); graph.len()];
	for (v, node) in graph.nodes.iter().enumerate() {
		for (w, _) in &node.deps {
			dependents[*w].push(v);
		}
	}
	let mut stack: Vec<usize> = (0..graph.len()).filter(|v| held[*v]).collect();
	while let Some(v) = stack.pop() {
		for dependent in &dependents[v] {
			if !std::mem::replace(&mut held[*dependent], true) {
				stack.push(*dependent);
			}
		}
	}
	(0..graph.len()).filter(|v| held[*v]).map(|v| graph.nodes[v].id).collect()
}

#[cfg(test)]
mod tests;

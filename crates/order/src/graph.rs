use std::borrow::Borrow;

use lemma_core::{ConcreteDefinition, DefinitionId, Dependency, FileId};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

pub(crate) struct Node {
	pub id: DefinitionId,
	pub file: FileId,
	/// In-set dependencies as node indices, with the header flag.
	pub deps: SmallVec<[(usize, bool); 4]>,
	/// Dependencies on definitions outside the set.
	pub outside: SmallVec<[Dependency; 2]>,
}

/// Dependency edges of a definition set; `A -> B` means A needs B checked first.
///
/// Nodes keep the order the definitions were given in, which is the
/// tie-breaker for everything emitted from the graph.
pub struct DependencyGraph {
	pub(crate) nodes: Vec<Node>,
	index: FxHashMap<DefinitionId, usize>,
}

impl DependencyGraph {
	pub fn build<D: Borrow<ConcreteDefinition>>(definitions: &[D]) -> Self {
		let index: FxHashMap<DefinitionId, usize> = definitions.iter().enumerate().map(|(i, d)| (d.borrow().id, i)).collect();
		let nodes = definitions
			.iter()
			.map(|d| {
				let d = d.borrow();
				let mut deps = SmallVec::new();
				let mut outside = SmallVec::new();
				for dependency in &d.dependencies {
					match index.get(&dependency.target) {
						Some(target) => deps.push((*target, dependency.header)),
						None => outside.push(*dependency),
					}
				}
				Node {
					id: d.id,
					file: d.file,
					deps,
					outside,
				}
			})
			.collect();
		Self { nodes, index }
	}

	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty()
	}

	pub fn contains(&self, id: DefinitionId) -> bool {
		self.index.contains_key(&id)
	}

	pub(crate) fn position(&self, id: DefinitionId) -> Option<usize> {
		self.index.get(&id).copied()
	}

	/// In-set dependencies of `id`.
	pub fn dependencies(&self, id: DefinitionId) -> Vec<DefinitionId> {
		self.position(id)
			.map(|i| self.nodes[i].deps.iter().map(|(j, _)| self.nodes[*j].id).collect())
			.unwrap_or_default()
	}

	/// Strongly connected components, each sorted by node position.
	///
	/// Components come out dependencies-first (Tarjan's order), which the
	/// emitter does not rely on.
	pub(crate) fn components(&self) -> Vec<Vec<usize>> {
		const UNVISITED: usize = usize::MAX;
		let n = self.nodes.len();
		let mut index = vec![UNVISITED; n];
		let mut lowlink = vec![0; n];
		let mut on_stack = vec![false; n];
		let mut stack = Vec::new();
		let mut next = 0;
		let mut components = Vec::new();

		for root in 0..n {
			if index[root] != UNVISITED {
				continue;
			}
			index[root] = next;
			lowlink[root] = next;
			next += 1;
			stack.push(root);
			on_stack[root] = true;
			let mut calls: Vec<(usize, usize)> = vec![(root, 0)];

			while let Some(frame) = calls.last_mut() {
				let v = frame.0;
				if frame.1 < self.nodes[v].deps.len() {
					let w = self.nodes[v].deps[frame.1].0;
					frame.1 += 1;
					if index[w] == UNVISITED {
						index[w] = next;
						lowlink[w] = next;
						next += 1;
						stack.push(w);
						on_stack[w] = true;
						calls.push((w, 0));
					} else if on_stack[w] {
						lowlink[v] = lowlink[v].min(index[w]);
					}
					continue;
				}

				calls.pop();
				if let Some((parent, _)) = calls.last() {
					lowlink[*parent] = lowlink[*parent].min(lowlink[v]);
				}
				if lowlink[v] == index[v] {
					let mut component = Vec::new();
					while let Some(w) = stack.pop() {
						on_stack[w] = false;
						component.push(w);
						if w == v {
							break;
						}
					}
					component.sort_unstable();
					components.push(component);
				}
			}
		}
		components
	}

	pub(crate) fn has_self_loop(&self, node: usize) -> bool {
		self.nodes[node].deps.iter().any(|(j, _)| *j == node)
	}

	/// Whether the header edges among `members` contain a cycle.
	pub(crate) fn has_header_cycle(&self, members: &[usize]) -> bool {
		#[derive(Clone, Copy, PartialEq, Eq)]
		enum Mark {
			New,
			Active,
			Done,
		}
		let local: FxHashMap<usize, usize> = members.iter().enumerate().map(|(i, m)| (*m, i)).collect();
		let header_deps = |node: usize| {
			self.nodes[node]
				.deps
				.iter()
				.filter(|(_, header)| *header)
				.filter_map(|(j, _)| local.get(j).copied())
				.collect::<SmallVec<[usize; 4]>>()
		};
		let edges: Vec<SmallVec<[usize; 4]>> = members.iter().map(|m| header_deps(*m)).collect();
		let mut marks = vec![Mark::New; members.len()];

		for root in 0..members.len() {
			if marks[root] != Mark::New {
				continue;
			}
			marks[root] = Mark::Active;
			let mut calls = vec![(root, 0usize)];
			while let Some(frame) = calls.last_mut() {
				let v = frame.0;
				if frame.1 < edges[v].len() {
					let w = edges[v][frame.1];
					frame.1 += 1;
					match marks[w] {
						Mark::Active => return true,
						Mark::New => {
							marks[w] = Mark::Active;
							calls.push((w, 0));
						}
						Mark::Done => {}
					}
				} else {
					marks[v] = Mark::Done;
					calls.pop();
				}
			}
		}
		false
	}
}

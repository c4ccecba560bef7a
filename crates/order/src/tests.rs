use std::time::Duration;

use lemma_core::concrete::ConcreteBody;
use lemma_core::{
	BlacklistReason, ClockValue, ConcreteDefinition, DefinitionId, DefinitionKind, DefinitionPath, DefinitionStore, Dependency, FileId,
	MessageKey, Precedence, Span, TypecheckStatus,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

use super::*;

fn def(id: u32, deps: &[(u32, bool)]) -> ConcreteDefinition {
	ConcreteDefinition {
		id: DefinitionId(id),
		file: FileId(0),
		name: format!("d{id}"),
		kind: DefinitionKind::Function,
		precedence: Precedence::default(),
		params: Vec::new(),
		result_type: None,
		body: ConcreteBody::None,
		span: Span::default(),
		name_span: Span::default(),
		parent: None,
		dependencies: deps
			.iter()
			.map(|(target, header)| Dependency {
				target: DefinitionId(*target),
				header: *header,
			})
			.collect(),
	}
}

fn groups(ordering: &Ordering) -> Vec<Vec<u32>> {
	ordering.groups.iter().map(|g| g.members.iter().map(|m| m.0).collect()).collect()
}

#[test]
fn dependency_comes_first() {
	let store = DefinitionStore::new();
	let ordering = order(&[def(1, &[(0, false)]), def(0, &[])], None, &store);
	assert_eq!(groups(&ordering), vec![vec![0], vec![1]]);
	assert!(ordering.diagnostics.is_empty());
	assert!(!ordering.groups[0].recursive);
}

#[test]
fn mutual_recursion_is_one_group() {
	let store = DefinitionStore::new();
	let ordering = order(&[def(0, &[(1, false)]), def(1, &[(0, false)]), def(2, &[(0, false)])], None, &store);
	assert_eq!(groups(&ordering), vec![vec![0, 1], vec![2]]);
	assert!(ordering.groups[0].recursive);
	assert!(ordering.diagnostics.is_empty(), "body-level recursion is not a type cycle");
}

#[test]
fn independent_definitions_keep_source_order() {
	let store = DefinitionStore::new();
	let ordering = order(&[def(2, &[]), def(0, &[]), def(1, &[])], None, &store);
	assert_eq!(groups(&ordering), vec![vec![2], vec![0], vec![1]]);
	assert_eq!(ordering.priority_groups, 0);
}

#[test]
fn priority_is_emitted_first() {
	let store = DefinitionStore::new();
	let defs = [def(0, &[]), def(1, &[]), def(2, &[])];
	let ordering = order(&defs, Some(DefinitionId(2)), &store);
	assert_eq!(groups(&ordering), vec![vec![2], vec![0], vec![1]]);
	assert_eq!(ordering.priority_groups, 1);
}

#[test]
fn priority_waits_for_its_dependencies() {
	let store = DefinitionStore::new();
	let defs = [def(0, &[]), def(1, &[]), def(2, &[(1, true)])];
	let phased = order_phased(&defs, Some(DefinitionId(2)), &store);
	let ids = |groups: &[OrderGroup]| groups.iter().flat_map(|g| g.members.iter().map(|m| m.0)).collect::<Vec<_>>();
	assert_eq!(ids(&phased.priority), vec![1, 2]);
	assert_eq!(ids(&phased.rest), vec![0]);
}

#[test]
fn priority_outside_the_set_is_ignored() {
	let store = DefinitionStore::new();
	let ordering = order(&[def(0, &[]), def(1, &[])], Some(DefinitionId(9)), &store);
	assert_eq!(groups(&ordering), vec![vec![0], vec![1]]);
	assert_eq!(ordering.priority_groups, 0);
}

#[test]
fn header_cycles_are_reported_on_every_member() {
	let store = DefinitionStore::new();
	let ordering = order(&[def(0, &[(1, true)]), def(1, &[(0, true)]), def(2, &[(2, true)]), def(3, &[])], None, &store);

	assert_eq!(groups(&ordering), vec![vec![0, 1], vec![2], vec![3]]);
	let cyclic: Vec<DefinitionId> = ordering
		.diagnostics
		.iter()
		.filter(|d| d.key == MessageKey::CyclicTypeDependency)
		.filter_map(|d| d.owner)
		.collect();
	assert_eq!(cyclic, vec![DefinitionId(0), DefinitionId(1), DefinitionId(2)]);
}

#[test]
fn mixed_cycle_through_a_body_edge_is_not_a_type_cycle() {
	let store = DefinitionStore::new();
	let ordering = order(&[def(0, &[(1, true)]), def(1, &[(0, false)])], None, &store);
	assert_eq!(groups(&ordering), vec![vec![0, 1]]);
	assert!(ordering.diagnostics.is_empty());
}

#[test]
fn outside_dependencies_are_checked_against_the_store() {
	let store = DefinitionStore::new();
	let file = store.register_file(None);
	let x = store.intern(file, &DefinitionPath::root("x"));
	let y = store.intern(file, &DefinitionPath::root("y"));
	let mut x_def = def(x.0, &[]);
	x_def.file = file;
	let mut y_def = def(y.0, &[]);
	y_def.file = file;
	store.install(file, ClockValue(1), vec![x_def, y_def]).unwrap();
	store.begin(&[x, y], ClockValue(1)).unwrap();
	store
		.blacklist(x, ClockValue(1), BlacklistReason::Timeout {
			budget: Duration::from_millis(10),
		})
		.unwrap();
	store.commit(y, ClockValue(1), TypecheckStatus::Ok).unwrap();

	let a = def(10, &[(x.0, false)]);
	let b = def(11, &[(10, false)]);
	let c = def(12, &[(y.0, true)]);
	let d = def(13, &[(999, false)]);
	let ordering = order(&[a, b, c, d], None, &store);

	assert_eq!(ordering.held, vec![DefinitionId(10), DefinitionId(11)]);
	assert_eq!(ordering.diagnostics.len(), 1);
	assert_eq!(ordering.diagnostics[0].key, MessageKey::ForwardReference);
	assert_eq!(ordering.diagnostics[0].owner, Some(DefinitionId(13)));
	assert_eq!(ordering.ids().count(), 4, "held definitions are still ordered");
}

fn graph_strategy() -> impl Strategy<Value = (usize, Vec<(usize, usize, bool)>, Option<usize>)> {
	(1usize..10).prop_flat_map(|n| {
		(
			Just(n),
			prop::collection::vec((0..n, 0..n, any::<bool>()), 0..n * 3),
			prop::option::of(0..n),
		)
	})
}

/// `reach[i][j]`: `i` depends on `j` through at least one edge.
fn reachability(n: usize, edges: &[(usize, usize, bool)]) -> Vec<Vec<bool>> {
	let mut reach = vec![vec![false; n]; n];
	for (a, b, _) in edges {
		reach[*a][*b] = true;
	}
	for k in 0..n {
		for i in 0..n {
			if reach[i][k] {
				for j in 0..n {
					if reach[k][j] {
						reach[i][j] = true;
					}
				}
			}
		}
	}
	reach
}

proptest! {
	#[test]
	fn groups_form_a_valid_order((n, edges, priority) in graph_strategy()) {
		let mut deps: Vec<Vec<(u32, bool)>> = vec![Vec::new(); n];
		for (a, b, header) in &edges {
			match deps[*a].iter_mut().find(|(t, _)| *t == *b as u32) {
				Some((_, h)) => *h |= *header,
				None => deps[*a].push((*b as u32, *header)),
			}
		}
		let defs: Vec<ConcreteDefinition> = deps.iter().enumerate().map(|(i, d)| def(i as u32, d)).collect();
		let store = DefinitionStore::new();
		let ordering = order(&defs, priority.map(|p| DefinitionId(p as u32)), &store);

		let mut seen: Vec<u32> = ordering.ids().map(|id| id.0).collect();
		seen.sort_unstable();
		prop_assert_eq!(seen, (0..n as u32).collect::<Vec<_>>());

		let position = |i: usize| ordering.position(DefinitionId(i as u32)).unwrap_or(usize::MAX);
		for (a, b, _) in &edges {
			prop_assert!(position(*b) <= position(*a));
		}

		let reach = reachability(n, &edges);
		for i in 0..n {
			for j in 0..n {
				let together = i == j || (reach[i][j] && reach[j][i]);
				prop_assert_eq!(position(i) == position(j), together);
			}
		}

		if let Some(p) = priority {
			let group = position(p);
			prop_assert_eq!(group + 1, ordering.priority_groups);
			for earlier in &ordering.groups[..group] {
				for member in &earlier.members {
					prop_assert!(reach[p][member.0 as usize]);
				}
			}
		}
	}
}

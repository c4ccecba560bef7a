//! Structural checks that need no typechecking.
//!
//! Used when the mode is [`lemma_config::TypecheckingMode::Dumb`]. The checks
//! only look at the concrete tree, so they never change a definition's status.
//! Unresolved references are left alone: resolution already reported them.

use lemma_core::concrete::{ConcreteClause, ConcreteParam, walk_expr};
use lemma_core::{ConcreteBody, ConcreteDefinition, ConcreteExpr, ConcretePattern, DefinitionKind, Diagnostic, DiagnosticOrigin, MessageKey, Severity};

#[derive(Debug, Clone, Copy, Default)]
pub struct DumbChecker;

impl DumbChecker {
	pub fn check(&self, definition: &ConcreteDefinition) -> Vec<Diagnostic> {
		let mut out = Vec::new();
		if definition.kind == DefinitionKind::Function
			&& let ConcreteBody::Clauses(clauses) = &definition.body
		{
			let expected = explicit_arity(&definition.params);
			check_clauses(definition, clauses, expected, &mut out);
		}
		definition.walk_exprs(&mut |expr: &ConcreteExpr| check_expr(definition, expr, &mut out));
		out
	}
}

fn check_expr(definition: &ConcreteDefinition, expr: &ConcreteExpr, out: &mut Vec<Diagnostic>) {
	match expr {
		ConcreteExpr::Goal { name, span, .. } => {
			let mut diagnostic = Diagnostic::at_span(definition.file, *span, Severity::Info, MessageKey::Goal, DiagnosticOrigin::DumbChecker)
				.with_owner(definition.id);
			if let Some(name) = name {
				diagnostic = diagnostic.with_arg(name.clone());
			}
			out.push(diagnostic);
		}
		ConcreteExpr::Case { scrutinees, clauses, span } => {
			if clauses.is_empty() {
				out.push(
					Diagnostic::at_span(definition.file, *span, Severity::Warning, MessageKey::EmptyCase, DiagnosticOrigin::DumbChecker)
						.with_owner(definition.id),
				);
			}
			check_clauses(definition, clauses, scrutinees.len(), out);
		}
		_ => {}
	}
}

fn check_clauses(definition: &ConcreteDefinition, clauses: &[ConcreteClause], expected: usize, out: &mut Vec<Diagnostic>) {
	for clause in clauses {
		let found = clause.patterns.iter().filter(|p| is_explicit(p)).count();
		if found != expected {
			out.push(
				Diagnostic::at_span(definition.file, clause.span, Severity::Error, MessageKey::PatternCountMismatch, DiagnosticOrigin::DumbChecker)
					.with_owner(definition.id)
					.with_arg(expected.to_string())
					.with_arg(found.to_string()),
			);
		}
	}
}

fn explicit_arity(params: &[ConcreteParam]) -> usize {
	params.iter().filter(|p| p.explicit).map(|p| p.binders.len().max(1)).sum()
}

fn is_explicit(pattern: &ConcretePattern) -> bool {
	match pattern {
		ConcretePattern::Binding { explicit, .. } | ConcretePattern::Constructor { explicit, .. } => *explicit,
		ConcretePattern::Tuple { .. } | ConcretePattern::Absurd { .. } | ConcretePattern::Error { .. } => true,
	}
}

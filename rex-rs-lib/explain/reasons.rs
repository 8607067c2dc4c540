use std::{collections::BTreeSet, fmt::Display};

use crate::{
    circuit::{Circuit, DecisionCircuit, NodeId, NodeLabel},
    literal::Literal,
    Result,
};

/// A conjunction of literals: one sufficient reason for a decision.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Reason {
    literals: BTreeSet<Literal>,
}

impl Reason {
    #[must_use]
    pub fn empty() -> Reason {
        Reason::default()
    }

    #[must_use]
    pub fn from_literals(literals: impl IntoIterator<Item = Literal>) -> Reason {
        Reason {
            literals: literals.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn singleton(literal: Literal) -> Reason {
        Reason::from_literals([literal])
    }

    pub fn literals(&self) -> impl Iterator<Item = &Literal> {
        self.literals.iter()
    }

    #[must_use]
    pub fn contains(&self, literal: &Literal) -> bool {
        self.literals.contains(literal)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.literals.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }

    #[must_use]
    pub(crate) fn union(&self, other: &Reason) -> Reason {
        Reason {
            literals: self.literals.union(&other.literals).copied().collect(),
        }
    }

    #[must_use]
    pub(crate) fn is_subset_of(&self, other: &Reason) -> bool {
        self.literals.is_subset(&other.literals)
    }
}

impl Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{{}}}",
            self.literals
                .iter()
                .map(|literal| literal.to_string())
                .collect::<Vec<String>>()
                .join(", ")
        )
    }
}

/// An irredundant cover of sufficient reasons: no element is a strict
/// superset of another and no duplicates remain. Canonically ordered, so
/// two covers over the same reasons compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReasonSet {
    reasons: Vec<Reason>,
}

impl ReasonSet {
    #[must_use]
    pub fn empty() -> ReasonSet {
        ReasonSet::default()
    }

    #[must_use]
    pub fn from_reasons(reasons: impl IntoIterator<Item = Reason>) -> ReasonSet {
        let mut reasons = subsume(reasons.into_iter().collect());
        reasons.sort();
        ReasonSet { reasons }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reason> {
        self.reasons.iter()
    }

    #[must_use]
    pub fn contains(&self, reason: &Reason) -> bool {
        self.reasons.contains(reason)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.reasons.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reasons.is_empty()
    }
}

impl Display for ReasonSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{\n{}\n}}",
            self.reasons
                .iter()
                .map(|reason| format!("  {reason}"))
                .collect::<Vec<String>>()
                .join(",\n")
        )
    }
}

/// Drop duplicates and strict supersets. Sorting by size first means a kept
/// reason can never be subsumed by a later one.
fn subsume(mut reasons: Vec<Reason>) -> Vec<Reason> {
    reasons.sort_by_key(Reason::len);

    let mut kept: Vec<Reason> = Vec::new();
    for candidate in reasons {
        if !kept.iter().any(|reason| reason.is_subset_of(&candidate)) {
            kept.push(candidate);
        }
    }

    kept
}

impl Circuit {
    /// Enumerate the reasons of every node reachable from `root`, bottom-up
    /// over the shared DAG, and return the root's cover. Mirrors the
    /// satisfiability evaluator: a node's cover is non-empty exactly when
    /// the node evaluates satisfiable.
    pub(crate) fn enumerate_reasons(&self, root: usize) -> Vec<Reason> {
        let mut table: Vec<Vec<Reason>> = vec![Vec::new(); self.nodes.len()];

        for idx in self.postorder_from(root) {
            let node = &self.nodes[idx];
            let reasons = match &node.label {
                NodeLabel::False => Vec::new(),
                NodeLabel::True => vec![Reason::empty()],
                NodeLabel::Literal(literal) => vec![Reason::singleton(*literal)],
                NodeLabel::Or(..) => {
                    let gathered = node
                        .children
                        .iter()
                        .flat_map(|child| table[child.index()].iter().cloned())
                        .collect();
                    subsume(gathered)
                }
                NodeLabel::And(..) => {
                    let mut product = vec![Reason::empty()];
                    for child in &node.children {
                        let mut combined =
                            Vec::with_capacity(product.len() * table[child.index()].len());
                        for left in &product {
                            for right in &table[child.index()] {
                                combined.push(left.union(right));
                            }
                        }
                        // Subsuming between combination steps is sound: a
                        // superset only ever extends into supersets.
                        product = subsume(combined);
                    }
                    product
                }
            };

            table[idx] = reasons;
        }

        std::mem::take(&mut table[root])
    }
}

impl DecisionCircuit {
    /// The minimal sufficient reasons (Π) for the circuit's decision.
    #[must_use]
    pub fn sufficient_reasons(&self) -> ReasonSet {
        self.reasons_from(self.inner.root())
            .unwrap_or_else(|_| ReasonSet::empty())
    }

    /// Π for the sub-circuit rooted at `node`.
    pub fn reasons_from(&self, node: NodeId) -> Result<ReasonSet> {
        self.inner.label(node)?;
        Ok(ReasonSet::from_reasons(
            self.inner.enumerate_reasons(node.index()),
        ))
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::{subsume, Reason, ReasonSet};
    use crate::{
        circuit::Circuit,
        literal::{Assignment, Instance, Literal, VariableIdx},
    };

    fn reason(literals: &[i64]) -> Reason {
        Reason::from_literals(
            literals
                .iter()
                .map(|value| Literal::from_dimacs(*value).unwrap()),
        )
    }

    fn load(text: &str) -> Circuit {
        Circuit::from_compiled(&mut text.as_bytes()).unwrap()
    }

    #[test]
    fn subsumption_drops_supersets_and_duplicates() {
        let reasons = vec![
            reason(&[1, 2, 3]),
            reason(&[1, 2]),
            reason(&[1, 2]),
            reason(&[-4]),
            reason(&[-4, 5]),
        ];

        assert_eq!(subsume(reasons), vec![reason(&[-4]), reason(&[1, 2])]);
    }

    #[test]
    fn incomparable_reasons_survive() {
        let set = ReasonSet::from_reasons([reason(&[1, 2]), reason(&[2, 3]), reason(&[1, 3])]);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn leaf_reason_sets() {
        // A single literal leaf.
        let leaf = load("nnf 1 0 2\nL -2\n");
        let decision = leaf
            .decision_circuit(&Instance::new(&[true, false]))
            .unwrap();
        assert_eq!(
            decision.sufficient_reasons(),
            ReasonSet::from_reasons([reason(&[-2])])
        );

        // The constant true has exactly the empty reason.
        let tautology = load("nnf 1 0 0\nA 0\n");
        let decision = tautology.decision_circuit(&Instance::new(&[])).unwrap();
        assert_eq!(
            decision.sufficient_reasons(),
            ReasonSet::from_reasons([Reason::empty()])
        );

        // The constant false has none.
        let contradiction = load("nnf 1 0 0\nO 0 0\n");
        let decision = contradiction.decision_circuit(&Instance::new(&[])).unwrap();
        assert!(decision.sufficient_reasons().is_empty());
    }

    #[test]
    fn conjunction_takes_the_union_product() {
        // x1 and (x2 ? x3 : x4), decomposable.
        let circuit = load(
            "nnf 9 10 4
L 3
L 4
L 2
L -2
A 2 2 0
A 2 3 1
O 2 2 4 5
L 1
A 2 7 6
",
        );
        let decision = circuit
            .decision_circuit(&Instance::new(&[true, true, true, true]))
            .unwrap();

        // The root cover is exactly the set of unions of one reason per
        // child: {1} with each of {2,3} and {3,4}.
        assert_eq!(
            decision.sufficient_reasons(),
            ReasonSet::from_reasons([reason(&[1, 2, 3]), reason(&[1, 3, 4])])
        );
    }

    #[test]
    fn satisfiability_agrees_with_reason_enumeration() {
        let circuit = load(
            "nnf 7 8 3
L 2
L 3
L 1
L -1
A 2 2 0
A 2 3 1
O 1 2 4 5
",
        );
        let decision = circuit
            .decision_circuit(&Instance::new(&[true, true, true]))
            .unwrap();

        // Satisfiable circuit, non-empty cover.
        assert!(decision.is_satisfiable());
        assert!(!decision.sufficient_reasons().is_empty());

        // Conditioning away every reason empties the cover and the
        // evaluator agrees.
        let conditioned = decision.inner.conditioned(&Assignment::from_pairs([
            (VariableIdx(2), false),
            (VariableIdx(3), false),
        ]));
        assert!(!conditioned.is_satisfiable());
        assert!(conditioned.enumerate_reasons(0).is_empty());
    }

    #[test]
    fn reasons_are_minimal_across_decisions() {
        // x1 ? x2 : x3 for the all-true instance. The then-branch yields
        // {1,2} and the consensus child {2,3}, which stays valid when x1
        // is left unconstrained.
        let circuit = load(
            "nnf 7 8 3
L 2
L 3
L 1
L -1
A 2 2 0
A 2 3 1
O 1 2 4 5
",
        );
        let decision = circuit
            .decision_circuit(&Instance::new(&[true, true, true]))
            .unwrap();

        assert_eq!(
            decision.sufficient_reasons(),
            ReasonSet::from_reasons([reason(&[1, 2]), reason(&[2, 3])])
        );
    }
}

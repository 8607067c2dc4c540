use core::fmt;
use std::fmt::Display;

use bitvec::slice::BitSlice;
use derive_more::From;
use rustc_hash::FxHashSet;

use crate::{
    literal::{Assignment, Instance, Literal, VariableIdx},
    Error, Result,
};

#[derive(Eq, PartialEq, Hash, Debug, PartialOrd, Ord, Clone, Copy, From)]
pub struct NodeId(pub u32);

impl NodeId {
    #[must_use]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// Kind of a circuit node. The decision-variable annotation is only present
/// on nodes that originate from the compiler's choice-node format (or their
/// negations); conjunctions introduced by the consensus pass carry none, and
/// nothing but negation ever reads the annotation on an `And`.
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum NodeLabel {
    True,
    False,
    Literal(Literal),
    And(Option<VariableIdx>),
    Or(Option<VariableIdx>),
}

impl NodeLabel {
    /// Label of the corresponding node in the negated circuit. The
    /// decision-variable annotation rides along, so negating twice restores
    /// the original label exactly.
    #[must_use]
    pub(crate) fn negated(&self) -> NodeLabel {
        match self {
            NodeLabel::True => NodeLabel::False,
            NodeLabel::False => NodeLabel::True,
            NodeLabel::Literal(literal) => NodeLabel::Literal(literal.negated()),
            NodeLabel::And(decision) => NodeLabel::Or(*decision),
            NodeLabel::Or(decision) => NodeLabel::And(*decision),
        }
    }
}

#[derive(PartialEq, Eq, Clone, Debug)]
pub(crate) struct Node {
    pub(crate) label: NodeLabel,
    pub(crate) children: Vec<NodeId>,
}

/// A compiled decision circuit: a DAG of labeled nodes with the root at
/// index 0 and, as loaded, child indices strictly increasing toward the
/// leaves. Logically immutable; every transform returns a fresh circuit.
///
/// The two destructive procedures of the pipeline are modeled as phase
/// transitions that consume their input: [`Circuit::consensus`] yields a
/// [`ConsensedCircuit`], whose [`ConsensedCircuit::filter`] yields the
/// instance-specific [`DecisionCircuit`]. Consensus therefore cannot be
/// applied twice to the same circuit value.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Circuit {
    pub(crate) nodes: Vec<Node>,
    pub(crate) variable_count: u32,
}

pub(crate) const ROOT: usize = 0;

impl Circuit {
    pub(crate) fn new(nodes: Vec<Node>, variable_count: u32) -> Circuit {
        Circuit {
            nodes,
            variable_count,
        }
    }

    #[must_use]
    pub fn root(&self) -> NodeId {
        NodeId(ROOT as u32)
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Highest variable index mentioned by a literal leaf.
    #[must_use]
    pub fn variable_count(&self) -> u32 {
        self.variable_count
    }

    pub fn label(&self, node: NodeId) -> Result<&NodeLabel> {
        self.node(node).map(|n| &n.label)
    }

    pub fn children(&self, node: NodeId) -> Result<&[NodeId]> {
        self.node(node).map(|n| n.children.as_slice())
    }

    fn node(&self, node: NodeId) -> Result<&Node> {
        self.nodes.get(node.index()).ok_or(Error::Index {
            index: node.0,
            node_count: self.nodes.len(),
        })
    }

    /// Negation of the circuit: same shape, `True`/`False` swapped,
    /// conjunctions and disjunctions swapped, literals sign-flipped.
    #[must_use]
    pub fn negated(&self) -> Circuit {
        let nodes = self
            .nodes
            .iter()
            .map(|node| Node {
                label: node.label.negated(),
                children: node.children.clone(),
            })
            .collect();

        Circuit::new(nodes, self.variable_count)
    }

    /// Remove the influence of the selected variables by rewriting every
    /// literal leaf of a selected variable to `True`, regardless of the
    /// literal's sign. On the smooth circuits the query layer builds this
    /// coincides with existential forgetting.
    #[must_use]
    pub fn quantified(&self, eliminated: &BitSlice) -> Circuit {
        let nodes = self
            .nodes
            .iter()
            .map(|node| {
                let selected = match &node.label {
                    NodeLabel::Literal(literal) => eliminated
                        .get(literal.variable().0 as usize - 1)
                        .is_some_and(|bit| *bit),
                    _ => false,
                };

                Node {
                    label: if selected {
                        NodeLabel::True
                    } else {
                        node.label.clone()
                    },
                    children: node.children.clone(),
                }
            })
            .collect();

        Circuit::new(nodes, self.variable_count)
    }

    /// Fix the assigned variables: a literal leaf of an assigned variable
    /// becomes `True` when its sign agrees with the assigned value and
    /// `False` otherwise. Everything else is copied unchanged.
    #[must_use]
    pub fn conditioned(&self, assignment: &Assignment) -> Circuit {
        let nodes = self
            .nodes
            .iter()
            .map(|node| {
                let label = match &node.label {
                    NodeLabel::Literal(literal) => match assignment.value(literal.variable()) {
                        Some(value) if literal.agrees_with(value) => NodeLabel::True,
                        Some(_) => NodeLabel::False,
                        None => node.label.clone(),
                    },
                    other => other.clone(),
                };

                Node {
                    label,
                    children: node.children.clone(),
                }
            })
            .collect();

        Circuit::new(nodes, self.variable_count)
    }

    /// Append a consensus conjunction to every annotated `Or` node: the
    /// children of its two branches, stripped of the decision variable's
    /// literals, become one new `And` node pushed as an extra child. Only
    /// nodes present before the pass are visited; consuming `self` makes a
    /// second application impossible.
    #[must_use]
    pub fn consensus(mut self) -> ConsensedCircuit {
        let original_count = self.nodes.len();

        for idx in 0..original_count {
            let NodeLabel::Or(Some(decision)) = self.nodes[idx].label else {
                continue;
            };

            let branches = self.nodes[idx].children.clone();
            let mut gathered: Vec<NodeId> = Vec::new();
            for branch in branches {
                for &grandchild in &self.nodes[branch.index()].children {
                    let resolved = matches!(
                        &self.nodes[grandchild.index()].label,
                        NodeLabel::Literal(literal) if literal.variable() == decision
                    );
                    if !resolved && !gathered.contains(&grandchild) {
                        gathered.push(grandchild);
                    }
                }
            }

            let consensus_node = NodeId(self.nodes.len() as u32);
            self.nodes.push(Node {
                label: NodeLabel::And(None),
                children: gathered,
            });
            self.nodes[idx].children.push(consensus_node);
        }

        tracing::debug!(
            appended = self.nodes.len() - original_count,
            "consensus pass finished"
        );

        ConsensedCircuit { inner: self }
    }

    /// Satisfiability of the whole circuit.
    #[must_use]
    pub fn is_satisfiable(&self) -> bool {
        self.evaluate_from(ROOT)
    }

    /// Satisfiability of the sub-circuit rooted at `node`.
    pub fn satisfiable_from(&self, node: NodeId) -> Result<bool> {
        self.node(node)?;
        Ok(self.evaluate_from(node.index()))
    }

    /// Post-order of all nodes reachable from `root`: children always
    /// precede their parents. Iterative so that circuit depth never
    /// translates into call-stack depth.
    pub(crate) fn postorder_from(&self, root: usize) -> Vec<usize> {
        let mut order = Vec::new();
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![(root, false)];

        while let Some((idx, expanded)) = stack.pop() {
            if expanded {
                order.push(idx);
                continue;
            }

            if seen[idx] {
                continue;
            }
            seen[idx] = true;

            stack.push((idx, true));
            for &child in &self.nodes[idx].children {
                if !seen[child.index()] {
                    stack.push((child.index(), false));
                }
            }
        }

        order
    }

    fn evaluate_from(&self, root: usize) -> bool {
        let mut value = vec![false; self.nodes.len()];

        for idx in self.postorder_from(root) {
            let node = &self.nodes[idx];
            value[idx] = match &node.label {
                NodeLabel::False => false,
                NodeLabel::True | NodeLabel::Literal(..) => true,
                // Every child is already evaluated; nothing short-circuits.
                NodeLabel::And(..) => node.children.iter().all(|child| value[child.index()]),
                NodeLabel::Or(..) => node.children.iter().any(|child| value[child.index()]),
            };
        }

        value[root]
    }

    /// Optional structural check for circuits in the loaded (pre-consensus)
    /// shape: child ordering, decomposability of conjunctions and
    /// determinism of annotated disjunctions.
    pub fn validate(&self) -> Result<()> {
        let supports = self.variable_supports();

        for (idx, node) in self.nodes.iter().enumerate() {
            for child in &node.children {
                if child.index() <= idx {
                    return Err(Error::Invariant(format!(
                        "node {idx} references child {child} outside the leafward order"
                    )));
                }
            }

            match &node.label {
                NodeLabel::And(..) => self.check_decomposable(idx, node, &supports)?,
                NodeLabel::Or(Some(decision)) => self.check_deterministic(idx, node, *decision)?,
                _ => {}
            }
        }

        Ok(())
    }

    fn check_decomposable(
        &self,
        idx: usize,
        node: &Node,
        supports: &[FxHashSet<u32>],
    ) -> Result<()> {
        let mut union: FxHashSet<u32> = FxHashSet::default();
        let mut total = 0;
        for child in &node.children {
            let support = &supports[child.index()];
            total += support.len();
            union.extend(support.iter().copied());
        }

        if union.len() != total {
            return Err(Error::Invariant(format!(
                "conjunction {idx} is not decomposable: its children share variables"
            )));
        }

        Ok(())
    }

    fn check_deterministic(&self, idx: usize, node: &Node, decision: VariableIdx) -> Result<()> {
        if node.children.len() != 2 {
            return Err(Error::Invariant(format!(
                "decision node {idx} on variable {decision} has {} children, expected 2",
                node.children.len()
            )));
        }

        let mut polarities = Vec::new();
        for child in &node.children {
            match self.branch_polarity(*child, decision) {
                Some(polarity) => polarities.push(polarity),
                None => {
                    return Err(Error::Invariant(format!(
                        "decision node {idx} has a branch that does not assert variable {decision}"
                    )))
                }
            }
        }

        if polarities[0] == polarities[1] {
            return Err(Error::Invariant(format!(
                "decision node {idx} is not deterministic: both branches agree on {decision}"
            )));
        }

        Ok(())
    }

    /// Sign with which a branch of a decision node asserts the decision
    /// variable: either the branch is that literal itself or a conjunction
    /// holding it as a direct child.
    fn branch_polarity(&self, branch: NodeId, decision: VariableIdx) -> Option<bool> {
        let assertion = |label: &NodeLabel| match label {
            NodeLabel::Literal(literal) if literal.variable() == decision => {
                Some(literal.agrees_with(true))
            }
            _ => None,
        };

        let node = &self.nodes[branch.index()];
        if let Some(polarity) = assertion(&node.label) {
            return Some(polarity);
        }

        if matches!(node.label, NodeLabel::And(..)) {
            for child in &node.children {
                if let Some(polarity) = assertion(&self.nodes[child.index()].label) {
                    return Some(polarity);
                }
            }
        }

        None
    }

    /// Variables appearing in literal descendants, per node.
    fn variable_supports(&self) -> Vec<FxHashSet<u32>> {
        let mut supports: Vec<FxHashSet<u32>> = vec![FxHashSet::default(); self.nodes.len()];

        for idx in self.postorder_from(ROOT) {
            let mut support = FxHashSet::default();
            if let NodeLabel::Literal(literal) = &self.nodes[idx].label {
                support.insert(literal.variable().0);
            }
            for child in &self.nodes[idx].children {
                support.extend(supports[child.index()].iter().copied());
            }
            supports[idx] = support;
        }

        supports
    }
}

/// A circuit whose consensus conjunctions have been appended. The only way
/// forward is instance filtering.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct ConsensedCircuit {
    pub(crate) inner: Circuit,
}

impl ConsensedCircuit {
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    /// Rewrite every literal leaf disagreeing with the instance to `False`,
    /// producing the decision circuit for that instance.
    pub fn filter(mut self, instance: &Instance) -> Result<DecisionCircuit> {
        if instance.variable_count() < self.inner.variable_count {
            return Err(Error::Precondition(format!(
                "instance assigns {} variables but the circuit mentions {}",
                instance.variable_count(),
                self.inner.variable_count
            )));
        }

        let mut rewritten = 0;
        for node in &mut self.inner.nodes {
            let NodeLabel::Literal(literal) = &node.label else {
                continue;
            };

            match instance.value(literal.variable()) {
                Some(value) if !literal.agrees_with(value) => {
                    node.label = NodeLabel::False;
                    rewritten += 1;
                }
                _ => {}
            }
        }

        tracing::debug!(rewritten, "filtered circuit for instance");

        Ok(DecisionCircuit {
            inner: self.inner,
            instance: instance.clone(),
        })
    }
}

/// The decision circuit of one instance: consensus applied once, then every
/// instance-inconsistent leaf rewritten to `False`. Reason enumeration and
/// the explanation queries operate on this type.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct DecisionCircuit {
    pub(crate) inner: Circuit,
    pub(crate) instance: Instance,
}

impl DecisionCircuit {
    #[must_use]
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    #[must_use]
    pub fn is_satisfiable(&self) -> bool {
        self.inner.is_satisfiable()
    }

    pub fn satisfiable_from(&self, node: NodeId) -> Result<bool> {
        self.inner.satisfiable_from(node)
    }
}

#[cfg(test)]
mod test {
    use bitvec::prelude::*;
    use pretty_assertions::assert_eq;

    use super::{Circuit, NodeLabel};
    use crate::{
        literal::{Assignment, Instance, VariableIdx},
        Error,
    };

    fn load(text: &str) -> Circuit {
        Circuit::from_compiled(&mut text.as_bytes()).unwrap()
    }

    /// x1 ? x2 : x3, as a two-level decision circuit.
    const SMALL: &str = "nnf 7 8 3
L 2
L 3
L 1
L -1
A 2 2 0
A 2 3 1
O 1 2 4 5
";

    #[test]
    fn double_negation_is_identity() {
        let circuit = load(SMALL);
        assert_eq!(circuit.negated().negated(), circuit);
    }

    #[test]
    fn negation_swaps_labels() {
        let circuit = load(SMALL);
        let negated = circuit.negated();

        // The decision annotation survives on the negated conjunction, so
        // negating again can restore the choice node unchanged.
        assert_eq!(
            *negated.label(circuit.root()).unwrap(),
            NodeLabel::And(Some(VariableIdx(1)))
        );
        // Child arrays are untouched.
        assert_eq!(
            negated.children(circuit.root()).unwrap(),
            circuit.children(circuit.root()).unwrap()
        );
    }

    #[test]
    fn conditioning_on_empty_assignment_changes_nothing() {
        let circuit = load(SMALL);
        let conditioned = circuit.conditioned(&Assignment::new());

        assert_eq!(conditioned, circuit);
        assert_eq!(conditioned.is_satisfiable(), circuit.is_satisfiable());
    }

    #[test]
    fn conditioning_fixes_literals() {
        let circuit = load(SMALL);

        // x2 false kills the then-branch; the else-branch stays open.
        let conditioned = circuit.conditioned(&Assignment::from_pairs([(VariableIdx(2), false)]));
        assert!(conditioned.is_satisfiable());

        // Forcing x1 true as well leaves no branch alive.
        let conditioned = circuit.conditioned(&Assignment::from_pairs([
            (VariableIdx(1), true),
            (VariableIdx(2), false),
        ]));
        assert!(!conditioned.is_satisfiable());
    }

    #[test]
    fn quantification_ignores_literal_sign() {
        let circuit = load(SMALL);
        let quantified = circuit.quantified(&bitvec![1, 0, 0]);

        // Both the positive and the negative leaf of x1 become True.
        let mut trues = 0;
        for idx in 0..quantified.node_count() as u32 {
            if *quantified.label(idx.into()).unwrap() == NodeLabel::True {
                trues += 1;
            }
        }
        assert_eq!(trues, 2);
    }

    #[test]
    fn consensus_appends_one_node_per_decision() {
        let circuit = load(SMALL);
        let before = circuit.node_count();

        let consensed = circuit.consensus();
        assert_eq!(consensed.node_count(), before + 1);

        // The appended conjunction holds both branches' payloads with the
        // decision literals stripped, and hangs off the Or node.
        let root = consensed.inner.root();
        assert_eq!(consensed.inner.children(root).unwrap().len(), 3);
        let appended = consensed.inner.children(root).unwrap()[2];
        assert_eq!(
            *consensed.inner.label(appended).unwrap(),
            NodeLabel::And(None)
        );
        assert_eq!(consensed.inner.children(appended).unwrap().len(), 2);
    }

    #[test]
    fn filter_rewrites_disagreeing_leaves() {
        let circuit = load(SMALL);
        let decision = circuit
            .consensus()
            .filter(&Instance::new(&[true, true, false]))
            .unwrap();

        assert!(decision.is_satisfiable());

        // Leaves -1 and 3 disagree with the instance.
        let mut falses = 0;
        for idx in 0..decision.node_count() as u32 {
            if *decision.inner.label(idx.into()).unwrap() == NodeLabel::False {
                falses += 1;
            }
        }
        assert_eq!(falses, 2);
    }

    #[test]
    fn filter_rejects_short_instances() {
        let circuit = load(SMALL);
        let result = circuit.consensus().filter(&Instance::new(&[true, true]));

        assert!(matches!(result, Err(Error::Precondition(..))));
    }

    #[test]
    fn satisfiability_out_of_range() {
        let circuit = load(SMALL);
        assert_eq!(
            circuit.satisfiable_from(99.into()),
            Err(Error::Index {
                index: 99,
                node_count: 7
            })
        );
    }

    #[test]
    fn constants_evaluate() {
        let tautology = load("nnf 1 0 0\nA 0\n");
        assert!(tautology.is_satisfiable());

        let contradiction = load("nnf 1 0 0\nO 0 0\n");
        assert!(!contradiction.is_satisfiable());
    }

    #[test]
    fn validation_accepts_well_formed_circuits() {
        assert_eq!(load(SMALL).validate(), Ok(()));
    }

    #[test]
    fn validation_rejects_shared_variables_in_conjunctions() {
        // And node whose children both mention x1.
        let broken = load("nnf 3 2 1\nL 1\nL -1\nA 2 0 1\n");
        assert!(matches!(broken.validate(), Err(Error::Invariant(..))));
    }

    #[test]
    fn validation_rejects_agreeing_decision_branches() {
        // Both branches of the decision node assert x1 positively.
        let broken = load("nnf 5 4 2\nL 2\nL 1\nA 2 1 0\nA 1 1\nO 1 2 2 3\n");
        assert!(matches!(broken.validate(), Err(Error::Invariant(..))));
    }
}

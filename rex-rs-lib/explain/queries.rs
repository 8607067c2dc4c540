//! Explanation queries over a decision circuit: necessary property,
//! necessary reason, "because", "even if ... because" and decision bias.

use std::collections::BTreeSet;

use bitvec::slice::BitSlice;

use crate::{
    circuit::{Circuit, DecisionCircuit},
    explain::Reason,
    literal::{Assignment, Instance, Literal, VariableIdx},
    Result,
};

impl Circuit {
    /// Build the decision circuit of one instance on a fresh copy: the
    /// consensus pass followed by instance filtering. The original circuit
    /// stays untouched and can serve further instances.
    pub fn decision_circuit(&self, instance: &Instance) -> Result<DecisionCircuit> {
        self.clone().consensus().filter(instance)
    }

    /// Would `candidate` still explain the decision if the properties in
    /// `flipped` were reversed? Rebuilds the decision circuit for the
    /// perturbed instance and re-runs [`DecisionCircuit::because`].
    pub fn even_if_because(
        &self,
        instance: &Instance,
        candidate: &Assignment,
        flipped: &[VariableIdx],
    ) -> Result<bool> {
        let perturbed = instance.with_flipped(flipped);
        Ok(self.decision_circuit(&perturbed)?.because(candidate))
    }
}

impl DecisionCircuit {
    /// Literals true in every sufficient reason: a variable's literal is
    /// necessary when forcing the variable the other way makes the decision
    /// circuit unsatisfiable.
    #[must_use]
    pub fn necessary_property(&self) -> Reason {
        let mut necessary: BTreeSet<Literal> = BTreeSet::new();

        for variable in (1..=self.instance.variable_count()).map(VariableIdx) {
            let forced_false = Assignment::from_pairs([(variable, false)]);
            if !self.inner.conditioned(&forced_false).is_satisfiable() {
                necessary.insert(Literal::positive(variable));
            }

            let forced_true = Assignment::from_pairs([(variable, true)]);
            if !self.inner.conditioned(&forced_true).is_satisfiable() {
                necessary.insert(Literal::negative(variable));
            }
        }

        Reason::from_literals(necessary)
    }

    /// The necessary property, when it alone already implies the decision;
    /// the empty reason otherwise. Implication is tested the same way as in
    /// [`DecisionCircuit::because`]: the negated decision circuit
    /// conditioned on the property must be unsatisfiable.
    #[must_use]
    pub fn necessary_reason(&self) -> Reason {
        let property = self.necessary_property();
        let assignment = Assignment::from_literals(property.literals().copied());

        if self.inner.negated().conditioned(&assignment).is_satisfiable() {
            Reason::empty()
        } else {
            property
        }
    }

    /// Is `candidate` the explanation of the decision? True iff the
    /// candidate implies the decision and is minimal: reversing any single
    /// literal of the candidate breaks the implication.
    #[must_use]
    pub fn because(&self, candidate: &Assignment) -> bool {
        let negated = self.inner.negated();

        if negated.conditioned(candidate).is_satisfiable() {
            // Some completion of the candidate reverses the decision.
            return false;
        }

        for (variable, _) in candidate.iter() {
            let weakened = candidate.with_flipped(variable);
            if !negated.conditioned(&weakened).is_satisfiable() {
                // The implication survives without this literal.
                return false;
            }
        }

        true
    }

    /// Does the decision depend on more than the unprotected variables?
    /// Quantifying the unprotected variables out and negating leaves a
    /// satisfiable circuit exactly when the outcome can still be altered
    /// while the protected literals keep their values.
    #[must_use]
    pub fn decision_bias(&self, unprotected: &BitSlice) -> bool {
        self.inner.quantified(unprotected).negated().is_satisfiable()
    }
}

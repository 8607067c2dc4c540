use std::{collections::BTreeMap, fmt::Display};

use bitvec::vec::BitVec;
use derive_more::From;

/// Index of a variable. Variables are numbered from 1, the way the
/// compiler's circuit format references them.
#[derive(Hash, Eq, PartialEq, Debug, Clone, Copy, PartialOrd, Ord, From)]
pub struct VariableIdx(pub u32);

impl Display for VariableIdx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Either true or false
#[derive(Hash, Clone, Debug, Eq, PartialEq, PartialOrd, Ord, Copy)]
pub enum Polarity {
    Positive,
    Negative,
}

impl From<bool> for Polarity {
    fn from(item: bool) -> Self {
        if item {
            Polarity::Positive
        } else {
            Polarity::Negative
        }
    }
}

impl std::ops::Not for Polarity {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            Polarity::Positive => Polarity::Negative,
            Polarity::Negative => Polarity::Positive,
        }
    }
}

/// A signed variable occurrence.
#[derive(Hash, Eq, PartialEq, Debug, Clone, Copy, PartialOrd, Ord)]
pub struct Literal {
    variable: VariableIdx,
    polarity: Polarity,
}

impl Literal {
    #[must_use]
    pub fn new(polarity: Polarity, variable: VariableIdx) -> Literal {
        Literal { variable, polarity }
    }

    #[must_use]
    pub fn positive(variable: VariableIdx) -> Literal {
        Literal::new(Polarity::Positive, variable)
    }

    #[must_use]
    pub fn negative(variable: VariableIdx) -> Literal {
        Literal::new(Polarity::Negative, variable)
    }

    /// Decode a signed integer literal: the sign encodes the polarity,
    /// the magnitude the variable. Zero encodes no literal.
    #[must_use]
    pub fn from_dimacs(value: i64) -> Option<Literal> {
        if value == 0 {
            return None;
        }

        let variable = VariableIdx(u32::try_from(value.unsigned_abs()).ok()?);
        Some(Literal::new(Polarity::from(value > 0), variable))
    }

    #[must_use]
    pub fn to_dimacs(self) -> i64 {
        let magnitude = i64::from(self.variable.0);
        match self.polarity {
            Polarity::Positive => magnitude,
            Polarity::Negative => -magnitude,
        }
    }

    #[must_use]
    pub fn negated(&self) -> Literal {
        Literal {
            variable: self.variable,
            polarity: !self.polarity,
        }
    }

    #[must_use]
    pub fn eq_negated(&self, other: &Literal) -> bool {
        self.variable == other.variable && self.polarity != other.polarity
    }

    #[must_use]
    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    #[must_use]
    pub fn variable(&self) -> VariableIdx {
        self.variable
    }

    /// Whether the literal holds when its variable takes `value`.
    #[must_use]
    pub fn agrees_with(&self, value: bool) -> bool {
        self.polarity == Polarity::from(value)
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let polarity = if self.polarity == Polarity::Positive {
            ""
        } else {
            "!"
        };
        write!(f, "{}{}", polarity, self.variable)
    }
}

/// A full assignment to variables 1..=m, one bit per variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    values: BitVec,
}

impl Instance {
    #[must_use]
    pub fn new(values: &[bool]) -> Instance {
        Instance {
            values: values.iter().collect(),
        }
    }

    #[must_use]
    pub fn from_bits(values: BitVec) -> Instance {
        Instance { values }
    }

    #[must_use]
    pub fn variable_count(&self) -> u32 {
        self.values.len() as u32
    }

    /// Value of a variable, `None` when the variable lies outside the instance.
    #[must_use]
    pub fn value(&self, variable: VariableIdx) -> Option<bool> {
        if variable.0 == 0 {
            return None;
        }

        self.values.get(variable.0 as usize - 1).map(|bit| *bit)
    }

    /// A copy of the instance with the listed variables reversed. Variables
    /// outside the instance are ignored.
    #[must_use]
    pub fn with_flipped(&self, variables: &[VariableIdx]) -> Instance {
        let mut values = self.values.clone();
        for variable in variables {
            let idx = variable.0 as usize;
            if idx >= 1 && idx <= values.len() {
                let current = values[idx - 1];
                values.set(idx - 1, !current);
            }
        }

        Instance { values }
    }

    pub fn literals(&self) -> impl Iterator<Item = Literal> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(|(idx, value)| Literal::new(Polarity::from(*value), VariableIdx(idx as u32 + 1)))
    }
}

impl Display for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({})",
            self.literals()
                .map(|literal| literal.to_string())
                .collect::<Vec<String>>()
                .join(", ")
        )
    }
}

/// A partial assignment mapping variables to truth values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assignment {
    values: BTreeMap<VariableIdx, bool>,
}

impl Assignment {
    #[must_use]
    pub fn new() -> Assignment {
        Assignment::default()
    }

    #[must_use]
    pub fn from_pairs(pairs: impl IntoIterator<Item = (VariableIdx, bool)>) -> Assignment {
        Assignment {
            values: pairs.into_iter().collect(),
        }
    }

    /// Assignment under which every given literal holds.
    #[must_use]
    pub fn from_literals(literals: impl IntoIterator<Item = Literal>) -> Assignment {
        Assignment {
            values: literals
                .into_iter()
                .map(|literal| (literal.variable(), literal.polarity() == Polarity::Positive))
                .collect(),
        }
    }

    pub fn assign(&mut self, variable: VariableIdx, value: bool) {
        self.values.insert(variable, value);
    }

    #[must_use]
    pub fn value(&self, variable: VariableIdx) -> Option<bool> {
        self.values.get(&variable).copied()
    }

    /// A copy of the assignment with one variable's value reversed.
    /// Unassigned variables are left untouched.
    #[must_use]
    pub fn with_flipped(&self, variable: VariableIdx) -> Assignment {
        let mut values = self.values.clone();
        if let Some(value) = values.get_mut(&variable) {
            *value = !*value;
        }

        Assignment { values }
    }

    pub fn iter(&self) -> impl Iterator<Item = (VariableIdx, bool)> + '_ {
        self.values
            .iter()
            .map(|(variable, value)| (*variable, *value))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::{Assignment, Instance, Literal, Polarity, VariableIdx};

    #[test]
    fn dimacs_round_trip() {
        let literal = Literal::from_dimacs(-4).unwrap();
        assert_eq!(literal.polarity(), Polarity::Negative);
        assert_eq!(literal.variable(), VariableIdx(4));
        assert_eq!(literal.to_dimacs(), -4);

        assert_eq!(Literal::from_dimacs(0), None);
        assert_eq!(Literal::from_dimacs(7).unwrap().to_dimacs(), 7);
    }

    #[test]
    fn literal_agreement() {
        let positive = Literal::positive(VariableIdx(2));
        assert!(positive.agrees_with(true));
        assert!(!positive.agrees_with(false));
        assert!(positive.negated().agrees_with(false));
        assert!(positive.eq_negated(&positive.negated()));
    }

    #[test]
    fn instance_flipping() {
        let instance = Instance::new(&[true, false, true]);
        assert_eq!(instance.value(VariableIdx(2)), Some(false));
        assert_eq!(instance.value(VariableIdx(4)), None);

        let flipped = instance.with_flipped(&[VariableIdx(2), VariableIdx(9)]);
        assert_eq!(flipped.value(VariableIdx(2)), Some(true));
        assert_eq!(flipped.value(VariableIdx(1)), Some(true));
        // The original is untouched.
        assert_eq!(instance.value(VariableIdx(2)), Some(false));
    }

    #[test]
    fn assignment_flipping() {
        let assignment = Assignment::from_pairs([(VariableIdx(1), true), (VariableIdx(3), false)]);
        let flipped = assignment.with_flipped(VariableIdx(3));

        assert_eq!(flipped.value(VariableIdx(3)), Some(true));
        assert_eq!(flipped.value(VariableIdx(1)), Some(true));
        assert_eq!(flipped.value(VariableIdx(2)), None);
    }

    #[test]
    fn assignment_from_literals() {
        let assignment = Assignment::from_literals([
            Literal::negative(VariableIdx(2)),
            Literal::positive(VariableIdx(5)),
        ]);

        assert_eq!(assignment.value(VariableIdx(2)), Some(false));
        assert_eq!(assignment.value(VariableIdx(5)), Some(true));
        assert_eq!(assignment.len(), 2);
    }
}

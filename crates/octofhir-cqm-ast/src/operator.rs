//! Operators of the measure-expression subset

use std::fmt;

/// Binary set operators over subject populations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetOperator {
    /// `union`, `or`, `|`
    Union,
    /// `intersect`, `and`
    Intersect,
    /// `except`
    Except,
}

impl SetOperator {
    pub const fn keyword(&self) -> &'static str {
        match self {
            Self::Union => "union",
            Self::Intersect => "intersect",
            Self::Except => "except",
        }
    }

    pub const fn sql_keyword(&self) -> &'static str {
        match self {
            Self::Union => "UNION",
            Self::Intersect => "INTERSECT",
            Self::Except => "EXCEPT",
        }
    }
}

/// Comparison operators usable in value and age predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparison {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

impl Comparison {
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::Less => "<",
            Self::LessOrEqual => "<=",
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
        }
    }

    /// SQL spelling (`<>` for inequality)
    pub const fn sql_symbol(&self) -> &'static str {
        match self {
            Self::NotEqual => "<>",
            other => other.symbol(),
        }
    }

    /// Evaluate `lhs <op> rhs`
    pub fn apply<T: PartialOrd + ?Sized>(&self, lhs: &T, rhs: &T) -> bool {
        match self {
            Self::Equal => lhs == rhs,
            Self::NotEqual => lhs != rhs,
            Self::Less => lhs < rhs,
            Self::LessOrEqual => lhs <= rhs,
            Self::Greater => lhs > rhs,
            Self::GreaterOrEqual => lhs >= rhs,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// `with` keeps left resources that have a matching related resource;
/// `without` keeps those that do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationshipKind {
    With,
    Without,
}

/// Which bound of an interval `start of` / `end of` selects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    Start,
    End,
}

impl Edge {
    pub const fn keyword(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::End => "end",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparison_apply() {
        assert!(Comparison::GreaterOrEqual.apply(&18, &18));
        assert!(!Comparison::Greater.apply(&18, &18));
        assert!(Comparison::NotEqual.apply("male", "female"));
        assert_eq!(Comparison::NotEqual.sql_symbol(), "<>");
    }
}

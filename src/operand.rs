use std::fmt;

use crate::register::{RegisterId, RegisterSet};

/// An instruction operand: a constant or a register to read at execution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Literal(i64),
    Reg(RegisterId),
}

impl Operand {
    /// The referenced register, if this operand is one.
    #[inline(always)]
    pub fn register(self) -> Option<RegisterId> {
        match self {
            Operand::Reg(id) => Some(id),
            Operand::Literal(_) => None,
        }
    }

    /// Parse a source token: an integer (optionally signed, `+4` included)
    /// or a register name from `set`.
    pub fn parse(token: &str, set: &RegisterSet) -> Option<Operand> {
        if let Ok(value) = token.parse::<i64>() {
            return Some(Operand::Literal(value));
        }
        set.resolve(token).map(Operand::Reg)
    }

    /// Render with source register names.
    pub fn render(self, set: &RegisterSet) -> String {
        match self {
            Operand::Literal(value) => value.to_string(),
            Operand::Reg(id) => set.name(id),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Literal(value) => write!(f, "{value}"),
            Operand::Reg(id) => write!(f, "{id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_literals() {
        let set = RegisterSet::Letters(4);
        assert_eq!(Operand::parse("41", &set), Some(Operand::Literal(41)));
        assert_eq!(Operand::parse("-3", &set), Some(Operand::Literal(-3)));
        assert_eq!(Operand::parse("+4", &set), Some(Operand::Literal(4)));
    }

    #[test]
    fn test_parse_registers() {
        let set = RegisterSet::Letters(4);
        assert_eq!(Operand::parse("c", &set), Some(Operand::Reg(RegisterId::new(2))));
        assert_eq!(Operand::parse("x", &set), None);
    }

    #[test]
    fn test_render() {
        let set = RegisterSet::named(["acc"]);
        assert_eq!(Operand::Reg(RegisterId::new(0)).render(&set), "acc");
        assert_eq!(Operand::Literal(-9).render(&set), "-9");
        assert_eq!(Operand::Reg(RegisterId::new(2)).to_string(), "%2");
    }
}

use std::ops::Index;

use crate::error::VmError;
use crate::isa::{Instruction, Opcode};
use crate::register::RegisterSet;

/// An ordered instruction buffer.
///
/// The length is fixed at construction. Opcodes can only be rewritten through
/// [`Program::patch`] (and [`Program::toggle`], which is built on it), which
/// enforces that the replacement accepts the instruction's operands.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Program {
    instructions: Vec<Instruction>,
}

impl Program {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self { instructions }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// The instruction at a (possibly negative) program counter.
    #[inline(always)]
    pub fn get(&self, pc: i64) -> Option<&Instruction> {
        usize::try_from(pc).ok().and_then(|i| self.instructions.get(i))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Instruction> {
        self.instructions.iter()
    }

    /// Replace the opcode at `address`.
    ///
    /// Returns `Ok(false)` without changing anything when `address` is
    /// outside the program. Fails if `opcode` does not accept the
    /// instruction's operand count.
    pub fn patch(&mut self, address: i64, opcode: Opcode) -> Result<bool, VmError> {
        let Some(slot) = usize::try_from(address)
            .ok()
            .and_then(|i| self.instructions.get_mut(i))
        else {
            return Ok(false);
        };
        if !slot.accepts(opcode) {
            return Err(VmError::PatchArity {
                address: address as usize,
                from: slot.opcode().mnemonic(),
                to: opcode.mnemonic(),
            });
        }
        *slot = slot.with_opcode(opcode);
        Ok(true)
    }

    /// Flip the instruction at `address` to its toggle partner. Out of range
    /// is a no-op and returns `false`.
    pub fn toggle(&mut self, address: i64) -> bool {
        let Some(target) = self.get(address).map(Instruction::toggled_opcode) else {
            return false;
        };
        // Toggle partners always share the operand count.
        self.patch(address, target).unwrap_or(false)
    }

    /// Human-readable listing, one instruction per line.
    pub fn listing(&self, set: &RegisterSet) -> String {
        use std::fmt::Write;
        let mut out = String::new();
        for (pc, instruction) in self.instructions.iter().enumerate() {
            let _ = writeln!(out, "{pc:>4}  {}", instruction.render(set));
        }
        out
    }
}

impl Index<usize> for Program {
    type Output = Instruction;

    fn index(&self, index: usize) -> &Self::Output {
        &self.instructions[index]
    }
}

impl FromIterator<Instruction> for Program {
    fn from_iter<T: IntoIterator<Item = Instruction>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Program {
    type Item = &'a Instruction;
    type IntoIter = std::slice::Iter<'a, Instruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operand::Operand;
    use crate::register::RegisterId;

    const A: Operand = Operand::Reg(RegisterId::new(0));

    fn sample() -> Program {
        Program::new(vec![
            Instruction::new(Opcode::Inc, &[A]).unwrap(),
            Instruction::new(Opcode::Jnz, &[A, Operand::Literal(-1)]).unwrap(),
            Instruction::new(Opcode::Nop, &[Operand::Literal(3)]).unwrap(),
        ])
    }

    #[test]
    fn test_get_out_of_range() {
        let program = sample();
        assert!(program.get(-1).is_none());
        assert!(program.get(3).is_none());
        assert_eq!(program.get(1).map(|i| i.opcode()), Some(Opcode::Jnz));
    }

    #[test]
    fn test_patch_preserves_length() {
        let mut program = sample();
        assert_eq!(program.patch(2, Opcode::Jmp), Ok(true));
        assert_eq!(program.len(), 3);
        assert_eq!(program[2].opcode(), Opcode::Jmp);
        assert_eq!(program[2].operands(), &[Operand::Literal(3)]);
    }

    #[test]
    fn test_patch_out_of_range_is_noop() {
        let mut program = sample();
        let before = program.clone();
        assert_eq!(program.patch(7, Opcode::Dec), Ok(false));
        assert_eq!(program.patch(-1, Opcode::Dec), Ok(false));
        assert_eq!(program, before);
    }

    #[test]
    fn test_patch_rejects_arity_change() {
        let mut program = sample();
        assert_eq!(
            program.patch(0, Opcode::Copy),
            Err(VmError::PatchArity {
                address: 0,
                from: "inc",
                to: "copy"
            })
        );
        assert_eq!(program[0].opcode(), Opcode::Inc);
    }

    #[test]
    fn test_toggle_twice_is_identity() {
        let mut program = sample();
        let before = program.clone();
        for address in 0..3 {
            assert!(program.toggle(address));
        }
        assert_eq!(program[0].opcode(), Opcode::Dec);
        assert_eq!(program[1].opcode(), Opcode::Copy);
        assert_eq!(program[2].opcode(), Opcode::Inc);
        program.toggle(0);
        program.toggle(1);
        assert_eq!(program[0], before[0]);
        assert_eq!(program[1], before[1]);
    }

    #[test]
    fn test_toggle_out_of_range() {
        let mut program = sample();
        assert!(!program.toggle(3));
        assert!(!program.toggle(-5));
    }

    #[test]
    fn test_listing() {
        let listing = sample().listing(&RegisterSet::Letters(1));
        assert_eq!(listing, "   0  inc a\n   1  jnz a -1\n   2  nop 3\n");
    }
}

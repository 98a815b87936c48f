use std::fmt;

use crate::error::DecodeError;
use crate::operand::Operand;
use crate::register::RegisterSet;

/// The closed instruction set shared by every dialect.
///
/// Operands follow one canonical order regardless of how a dialect writes
/// them: sources first, destination last for the three-operand bitwise and
/// comparison forms, destination first for the two-operand arithmetic forms
/// (`add dst rhs` means `dst <- dst + rhs`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Opcode {
    /// `copy src dst`
    Copy,
    Inc,
    Dec,
    /// `add dst rhs`
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Half,
    Triple,
    /// `jmp offset`
    Jmp,
    /// `jnz cond offset`
    Jnz,
    /// `jgz cond offset`
    Jgz,
    /// Jump if even.
    Jie,
    /// Jump if one.
    Jio,
    /// `tgl offset`: toggle the instruction at pc + offset.
    Tgl,
    In,
    Out,
    /// `and lhs rhs dst`
    And,
    Or,
    Xor,
    /// `not src dst`
    Not,
    /// `shl src amount dst`
    Shl,
    Shr,
    /// `eq lhs rhs dst`
    Eq,
    Lt,
    Gt,
    /// `load addr dst`
    Load,
    /// `store src addr`
    Store,
    Nop,
    Halt,
}

/// What a machine must be configured with to run an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Core,
    Io,
    SelfModify,
    Memory,
}

impl Opcode {
    pub const ALL: [Opcode; 31] = [
        Opcode::Copy,
        Opcode::Inc,
        Opcode::Dec,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Mod,
        Opcode::Half,
        Opcode::Triple,
        Opcode::Jmp,
        Opcode::Jnz,
        Opcode::Jgz,
        Opcode::Jie,
        Opcode::Jio,
        Opcode::Tgl,
        Opcode::In,
        Opcode::Out,
        Opcode::And,
        Opcode::Or,
        Opcode::Xor,
        Opcode::Not,
        Opcode::Shl,
        Opcode::Shr,
        Opcode::Eq,
        Opcode::Lt,
        Opcode::Gt,
        Opcode::Load,
        Opcode::Store,
        Opcode::Nop,
        Opcode::Halt,
    ];

    pub const COUNT: usize = Self::ALL.len();

    #[inline(always)]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn arity(self) -> usize {
        use Opcode::*;
        match self {
            Nop | Halt => 0,
            Inc | Dec | Half | Triple | Jmp | Tgl | In | Out => 1,
            Copy | Add | Sub | Mul | Div | Mod | Jnz | Jgz | Jie | Jio | Not | Load | Store => 2,
            And | Or | Xor | Shl | Shr | Eq | Lt | Gt => 3,
        }
    }

    /// The operand slot this opcode writes, if any.
    pub const fn destination(self) -> Option<usize> {
        use Opcode::*;
        match self {
            Inc | Dec | Add | Sub | Mul | Div | Mod | Half | Triple | In => Some(0),
            Copy | Not | Load => Some(1),
            And | Or | Xor | Shl | Shr | Eq | Lt | Gt => Some(2),
            Jmp | Jnz | Jgz | Jie | Jio | Tgl | Out | Store | Nop | Halt => None,
        }
    }

    pub const fn capability(self) -> Capability {
        match self {
            Opcode::In | Opcode::Out => Capability::Io,
            Opcode::Tgl => Capability::SelfModify,
            Opcode::Load | Opcode::Store => Capability::Memory,
            _ => Capability::Core,
        }
    }

    /// Canonical lower-case mnemonic.
    pub const fn mnemonic(self) -> &'static str {
        use Opcode::*;
        match self {
            Copy => "copy",
            Inc => "inc",
            Dec => "dec",
            Add => "add",
            Sub => "sub",
            Mul => "mul",
            Div => "div",
            Mod => "mod",
            Half => "half",
            Triple => "triple",
            Jmp => "jmp",
            Jnz => "jnz",
            Jgz => "jgz",
            Jie => "jie",
            Jio => "jio",
            Tgl => "tgl",
            In => "in",
            Out => "out",
            And => "and",
            Or => "or",
            Xor => "xor",
            Not => "not",
            Shl => "shl",
            Shr => "shr",
            Eq => "eq",
            Lt => "lt",
            Gt => "gt",
            Load => "load",
            Store => "store",
            Nop => "nop",
            Halt => "halt",
        }
    }

    pub fn from_mnemonic(mnemonic: &str) -> Option<Opcode> {
        Self::ALL.into_iter().find(|op| op.mnemonic() == mnemonic)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// A decoded instruction.
///
/// Holds up to three operands inline. The operand count is fixed at decode
/// time; only the opcode may change afterwards, and only to another opcode
/// that accepts the same count (see [`Instruction::accepts`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    opcode: Opcode,
    operands: [Operand; 3],
    count: u8,
}

impl Instruction {
    /// Build an instruction, checking operand count and that the destination
    /// slot (if any) names a register.
    ///
    /// `Nop` accepts and ignores up to three operands, so that an instruction
    /// like `nop +4` keeps its argument for a later patch into `jmp +4`.
    pub fn new(opcode: Opcode, operands: &[Operand]) -> Result<Self, DecodeError> {
        let count = operands.len();
        let fits = count == opcode.arity() || (opcode == Opcode::Nop && count <= 3);
        if !fits {
            return Err(DecodeError::Arity {
                mnemonic: opcode.mnemonic(),
                expected: opcode.arity(),
                actual: count,
            });
        }
        if let Some(slot) = opcode.destination() {
            if let Operand::Literal(value) = operands[slot] {
                return Err(DecodeError::LiteralDestination {
                    mnemonic: opcode.mnemonic(),
                    value,
                });
            }
        }
        let mut slots = [Operand::Literal(0); 3];
        slots[..count].copy_from_slice(operands);
        Ok(Self {
            opcode,
            operands: slots,
            count: count as u8,
        })
    }

    #[inline(always)]
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn operands(&self) -> &[Operand] {
        &self.operands[..self.count as usize]
    }

    /// All three slots; unused ones hold `Literal(0)`.
    #[inline(always)]
    pub(crate) fn slots(&self) -> [Operand; 3] {
        self.operands
    }

    /// Whether `opcode` can take over this instruction's operands.
    pub fn accepts(&self, opcode: Opcode) -> bool {
        self.count as usize == opcode.arity() || opcode == Opcode::Nop
    }

    /// True when the destination slot (if any) holds a register. Always true
    /// right after decoding; self-modification can break it.
    pub fn writes_register(&self) -> bool {
        match self.opcode.destination() {
            Some(slot) => matches!(self.operands[slot], Operand::Reg(_)),
            None => true,
        }
    }

    pub(crate) fn with_opcode(mut self, opcode: Opcode) -> Self {
        self.opcode = opcode;
        self
    }

    /// The opcode a toggle turns this instruction into.
    ///
    /// One-operand instructions become `inc`, except `inc` which becomes
    /// `dec`. Two-operand instructions become `jnz`, except `jnz` which
    /// becomes `copy`. Other operand counts are left alone.
    pub fn toggled_opcode(&self) -> Opcode {
        match (self.count, self.opcode) {
            (1, Opcode::Inc) => Opcode::Dec,
            (1, _) => Opcode::Inc,
            (2, Opcode::Jnz) => Opcode::Copy,
            (2, _) => Opcode::Jnz,
            _ => self.opcode,
        }
    }

    /// Render with source register names, e.g. `jnz a -2`.
    pub fn render(&self, set: &RegisterSet) -> String {
        let mut out = self.opcode.mnemonic().to_string();
        for operand in self.operands() {
            out.push(' ');
            out.push_str(&operand.render(set));
        }
        out
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.opcode.mnemonic())?;
        for operand in self.operands() {
            write!(f, " {operand}")?;
        }
        Ok(())
    }
}

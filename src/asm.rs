//! Text front end: mnemonic dialects that decode source lines into
//! [`Instruction`]s.
//!
//! Each dialect is a table from its own mnemonics to canonical opcodes plus an
//! operand layout, and carries the machine configuration its programs expect.

use std::fmt;
use std::str::FromStr;

use crate::error::DecodeError;
use crate::isa::{Instruction, Opcode};
use crate::machine::MachineConfig;
use crate::operand::Operand;
use crate::program::Program;
use crate::register::RegisterSet;

/// How a dialect's operands map onto the canonical operand order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    AsWritten,
    /// `set X Y` means `copy Y X`.
    Swapped,
    /// `acc N` means `add acc N`.
    Accumulate,
}

type Entry = (&'static str, Opcode, Layout);

const ASSEMBUNNY: &[Entry] = &[
    ("cpy", Opcode::Copy, Layout::AsWritten),
    ("inc", Opcode::Inc, Layout::AsWritten),
    ("dec", Opcode::Dec, Layout::AsWritten),
    ("jnz", Opcode::Jnz, Layout::AsWritten),
    ("tgl", Opcode::Tgl, Layout::AsWritten),
    ("out", Opcode::Out, Layout::AsWritten),
];

const DUET: &[Entry] = &[
    ("set", Opcode::Copy, Layout::Swapped),
    ("add", Opcode::Add, Layout::AsWritten),
    ("sub", Opcode::Sub, Layout::AsWritten),
    ("mul", Opcode::Mul, Layout::AsWritten),
    ("mod", Opcode::Mod, Layout::AsWritten),
    ("snd", Opcode::Out, Layout::AsWritten),
    ("rcv", Opcode::In, Layout::AsWritten),
    ("jgz", Opcode::Jgz, Layout::AsWritten),
    ("jnz", Opcode::Jnz, Layout::AsWritten),
];

const LOCK: &[Entry] = &[
    ("hlf", Opcode::Half, Layout::AsWritten),
    ("tpl", Opcode::Triple, Layout::AsWritten),
    ("inc", Opcode::Inc, Layout::AsWritten),
    ("jmp", Opcode::Jmp, Layout::AsWritten),
    ("jie", Opcode::Jie, Layout::AsWritten),
    ("jio", Opcode::Jio, Layout::AsWritten),
];

const HANDHELD: &[Entry] = &[
    ("acc", Opcode::Add, Layout::Accumulate),
    ("jmp", Opcode::Jmp, Layout::AsWritten),
    ("nop", Opcode::Nop, Layout::AsWritten),
];

/// The accumulator register of the handheld dialect.
const ACCUMULATOR: &str = "acc";

/// A mnemonic vocabulary for the shared instruction set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// `cpy inc dec jnz tgl out` over registers a-d.
    Assembunny,
    /// `set add sub mul mod snd rcv jgz jnz` over registers a-z.
    Duet,
    /// `hlf tpl inc jmp jie jio` over registers a and b.
    Lock,
    /// `acc jmp nop` over a single accumulator.
    Handheld,
    /// Canonical opcode mnemonics and operand order, every feature enabled.
    Canonical,
}

impl Dialect {
    pub const ALL: [Dialect; 5] = [
        Dialect::Assembunny,
        Dialect::Duet,
        Dialect::Lock,
        Dialect::Handheld,
        Dialect::Canonical,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Dialect::Assembunny => "assembunny",
            Dialect::Duet => "duet",
            Dialect::Lock => "lock",
            Dialect::Handheld => "handheld",
            Dialect::Canonical => "canonical",
        }
    }

    /// The configuration programs in this dialect expect.
    pub fn config(self) -> MachineConfig {
        let base = MachineConfig::default();
        match self {
            Dialect::Assembunny => MachineConfig {
                registers: RegisterSet::Letters(4),
                self_modifying: true,
                io: true,
                ..base
            },
            Dialect::Duet => MachineConfig {
                registers: RegisterSet::Letters(26),
                io: true,
                ..base
            },
            Dialect::Lock => MachineConfig {
                registers: RegisterSet::Letters(2),
                ..base
            },
            Dialect::Handheld => MachineConfig {
                registers: RegisterSet::named([ACCUMULATOR]),
                ..base
            },
            Dialect::Canonical => MachineConfig {
                registers: RegisterSet::Letters(26),
                self_modifying: true,
                io: true,
                aux_memory: true,
                ..base
            },
        }
    }

    fn table(self) -> &'static [Entry] {
        match self {
            Dialect::Assembunny => ASSEMBUNNY,
            Dialect::Duet => DUET,
            Dialect::Lock => LOCK,
            Dialect::Handheld => HANDHELD,
            Dialect::Canonical => &[],
        }
    }

    fn lookup(self, mnemonic: &str) -> Option<Entry> {
        if self == Dialect::Canonical {
            return Opcode::from_mnemonic(mnemonic).map(|op| (op.mnemonic(), op, Layout::AsWritten));
        }
        self.table().iter().copied().find(|(m, _, _)| *m == mnemonic)
    }

    /// Decode a whole source text using this dialect's register set.
    pub fn decode(self, source: &str) -> Result<Program, DecodeError> {
        self.decode_with(source, &self.config().registers)
    }

    /// Decode against an explicit register set. Blank lines and lines
    /// starting with `#` are skipped; errors carry the 1-based line number.
    pub fn decode_with(self, source: &str, registers: &RegisterSet) -> Result<Program, DecodeError> {
        source
            .lines()
            .enumerate()
            .map(|(index, line)| (index, line.trim()))
            .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
            .map(|(index, line)| {
                self.decode_line(line, registers)
                    .map_err(|e| e.at_line(index + 1))
            })
            .collect()
    }

    /// Decode a single instruction. Operands are separated by whitespace
    /// and/or commas.
    pub fn decode_line(self, line: &str, registers: &RegisterSet) -> Result<Instruction, DecodeError> {
        let mut tokens = line
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|t| !t.is_empty());
        let mnemonic = tokens.next().unwrap_or_default();
        let (name, opcode, layout) = self
            .lookup(mnemonic)
            .ok_or_else(|| DecodeError::UnknownMnemonic(mnemonic.to_string()))?;

        let mut operands = tokens
            .map(|token| {
                Operand::parse(token, registers).ok_or_else(|| DecodeError::UnknownRegister(token.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let expected = match layout {
            Layout::Accumulate => opcode.arity() - 1,
            _ => opcode.arity(),
        };
        if operands.len() != expected && opcode != Opcode::Nop {
            return Err(DecodeError::Arity {
                mnemonic: name,
                expected,
                actual: operands.len(),
            });
        }

        match layout {
            Layout::AsWritten => {}
            Layout::Swapped => operands.reverse(),
            Layout::Accumulate => {
                let acc = registers
                    .resolve(ACCUMULATOR)
                    .ok_or_else(|| DecodeError::UnknownRegister(ACCUMULATOR.to_string()))?;
                operands.insert(0, Operand::Reg(acc));
            }
        }

        Instruction::new(opcode, &operands).map_err(|err| match err {
            DecodeError::LiteralDestination { value, .. } => DecodeError::LiteralDestination { mnemonic: name, value },
            other => other,
        })
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|d| d.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| DecodeError::UnknownDialect(s.to_string()))
    }
}

use thiserror::Error;

/// Errors raised while turning source text into instructions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The mnemonic is not part of the dialect.
    #[error("unknown mnemonic `{0}`")]
    UnknownMnemonic(String),
    /// Wrong number of operands for the mnemonic.
    #[error("`{mnemonic}` takes {expected} operand(s), got {actual}")]
    Arity {
        mnemonic: &'static str,
        expected: usize,
        actual: usize,
    },
    /// An operand is neither an integer nor a register of the configured set.
    #[error("unknown register `{0}`")]
    UnknownRegister(String),
    /// A destination slot holds a literal.
    #[error("`{mnemonic}` cannot write to literal {value}")]
    LiteralDestination { mnemonic: &'static str, value: i64 },
    /// Dialect name not recognised.
    #[error("unknown dialect `{0}`")]
    UnknownDialect(String),
    /// Any of the above, with the 1-based source line it came from.
    #[error("line {line}: {source}")]
    Line {
        line: usize,
        #[source]
        source: Box<DecodeError>,
    },
}

impl DecodeError {
    pub(crate) fn at_line(self, line: usize) -> Self {
        DecodeError::Line {
            line,
            source: Box::new(self),
        }
    }
}

/// Errors raised while constructing or running a machine.
///
/// A fatal error aborts the current `run` and leaves the machine state as it
/// was at the failing instruction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    /// The program cannot run under the given configuration.
    #[error("malformed program at instruction {pc}: {reason}")]
    Malformed { pc: usize, reason: String },
    /// A register name outside the configured register set.
    #[error("invalid register `{0}`")]
    InvalidRegister(String),
    /// Division or remainder by zero.
    #[error("division by zero at pc {pc}")]
    DivisionByZero { pc: i64 },
    /// Shift amount is negative or at least the word width.
    #[error("invalid shift amount {amount} at pc {pc}")]
    InvalidShift { pc: i64, amount: i64 },
    /// Arithmetic result does not fit in 64 bits.
    #[error("arithmetic overflow in `{opcode}` at pc {pc}")]
    Overflow { pc: i64, opcode: &'static str },
    /// `Program::patch` was asked to change an instruction's operand count.
    #[error("cannot patch `{from}` at {address} into `{to}`: operand count differs")]
    PatchArity {
        address: usize,
        from: &'static str,
        to: &'static str,
    },
}

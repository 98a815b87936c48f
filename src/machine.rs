use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{Level, debug, log_enabled, trace};

use crate::error::VmError;
use crate::isa::{Capability, Instruction, Opcode};
use crate::memory::Memory;
use crate::operand::Operand;
use crate::program::Program;
use crate::register::{RegisterFile, RegisterId, RegisterSet};

/// How jump operands are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JumpMode {
    /// Target is `pc + offset`.
    #[default]
    Relative,
    /// Target is the operand itself.
    Absolute,
}

/// Per-machine configuration.
///
/// Optional features are off by default; a program that uses an opcode
/// whose feature is off is rejected by [`Machine::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineConfig {
    /// Register naming scheme and register count.
    pub registers: RegisterSet,
    pub jump_mode: JumpMode,
    /// Allow `tgl`.
    pub self_modifying: bool,
    /// Allow `in` / `out` and enable the input and output queues.
    pub io: bool,
    /// Allow `load` / `store` against sparse auxiliary memory.
    pub aux_memory: bool,
    /// Applied to every value written to a register.
    pub word_mask: Option<i64>,
    /// Executed-instruction budget; reaching it cancels the machine.
    pub step_limit: Option<u64>,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            registers: RegisterSet::default(),
            jump_mode: JumpMode::Relative,
            self_modifying: false,
            io: false,
            aux_memory: false,
            word_mask: None,
            step_limit: None,
        }
    }
}

/// Lifecycle of a machine. `Halted` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ready,
    Running,
    AwaitingInput,
    Halted,
    Cancelled,
}

/// Why a call to [`Machine::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// The program counter left the program. Checked before cancellation.
    Halted,
    /// An `in` found the input queue empty. Enqueue input and run again.
    AwaitingInput,
    /// The cancel token was set, or the step limit was reached.
    Cancelled,
}

/// Cooperative cancellation flag, checked once per instruction boundary.
///
/// Clones share the flag, so a listener closure can hold one.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Read-only view handed to PC listeners, taken before the instruction at
/// `pc` executes.
pub struct Probe<'a> {
    pc: i64,
    registers: &'a RegisterFile,
    names: &'a RegisterSet,
    cancel: &'a CancelToken,
}

impl Probe<'_> {
    pub fn pc(&self) -> i64 {
        self.pc
    }

    /// `None` for an id outside the configured register set.
    pub fn register(&self, id: RegisterId) -> Option<i64> {
        self.names.contains(id).then(|| self.registers.get(id))
    }

    pub fn read(&self, name: &str) -> Option<i64> {
        self.names.resolve(name).map(|id| self.registers.get(id))
    }

    /// Request cancellation of the current run. The instruction at this PC
    /// still executes; the request is seen at the next boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

type Listener = Box<dyn FnMut(&Probe<'_>) + Send>;

/// What the dispatcher asks the run loop to do after one instruction.
enum Flow {
    Next,
    Jump(i64),
    Suspend,
    Halt,
}

/// A register machine executing a fixed program.
pub struct Machine {
    program: Program,
    config: MachineConfig,
    registers: RegisterFile,
    pc: i64,
    status: Status,
    memory: Memory,
    input: VecDeque<i64>,
    output: VecDeque<i64>,
    listeners: HashMap<i64, Vec<Listener>>,
    steps: u64,
    profile: [u64; Opcode::COUNT],
}

impl Machine {
    /// Validate `program` against `config` and build a machine in the
    /// `Ready` state with every register at zero.
    pub fn new(program: Program, config: MachineConfig) -> Result<Self, VmError> {
        validate(&program, &config)?;
        debug!(
            "loaded {} instructions, {} registers, {:?} jumps",
            program.len(),
            config.registers.len(),
            config.jump_mode
        );
        Ok(Self {
            registers: RegisterFile::new(config.registers.len()),
            program,
            config,
            pc: 0,
            status: Status::Ready,
            memory: Memory::new(),
            input: VecDeque::new(),
            output: VecDeque::new(),
            listeners: HashMap::new(),
            steps: 0,
            profile: [0; Opcode::COUNT],
        })
    }

    /// Like [`Machine::new`], then write each `(name, value)` pair.
    pub fn with_registers<'n, I>(
        program: Program,
        config: MachineConfig,
        init: I,
    ) -> Result<Self, VmError>
    where
        I: IntoIterator<Item = (&'n str, i64)>,
    {
        let mut machine = Self::new(program, config)?;
        for (name, value) in init {
            machine.write_register(name, value)?;
        }
        Ok(machine)
    }

    /// Execute until the program halts, needs input, or is cancelled.
    ///
    /// Calling `run` on a halted or cancelled machine returns the same exit
    /// again without executing anything. After `AwaitingInput`, enqueue input
    /// and call `run` again to resume at the same `in` instruction.
    pub fn run(&mut self, cancel: &CancelToken) -> Result<Exit, VmError> {
        loop {
            if let Some(exit) = self.advance(cancel)? {
                return Ok(exit);
            }
        }
    }

    /// [`Machine::run`] with a token nobody else holds.
    pub fn run_to_end(&mut self) -> Result<Exit, VmError> {
        self.run(&CancelToken::new())
    }

    /// Execute at most one instruction. Returns `Some(exit)` when the machine
    /// stopped instead of executing. A cancel requested by a listener during
    /// this step is seen by the next call with the same token.
    pub fn step(&mut self, cancel: &CancelToken) -> Result<Option<Exit>, VmError> {
        self.advance(cancel)
    }

    fn advance(&mut self, cancel: &CancelToken) -> Result<Option<Exit>, VmError> {
        match self.status {
            Status::Halted => return Ok(Some(Exit::Halted)),
            Status::Cancelled => return Ok(Some(Exit::Cancelled)),
            Status::Ready => {
                debug!("starting at pc {}", self.pc);
                self.status = Status::Running;
            }
            Status::AwaitingInput => self.status = Status::Running,
            Status::Running => {}
        }

        // Leaving the program always wins, so Halted <=> pc out of range.
        let pc = self.pc;
        let Some(&instruction) = self.program.get(pc) else {
            return Ok(Some(self.finish(Exit::Halted)));
        };

        if cancel.is_cancelled() {
            return Ok(Some(self.finish(Exit::Cancelled)));
        }
        if self.config.step_limit.is_some_and(|limit| self.steps >= limit) {
            debug!("step limit of {} reached", self.steps);
            return Ok(Some(self.finish(Exit::Cancelled)));
        }

        self.notify(pc, cancel);
        if log_enabled!(Level::Trace) {
            trace!("{pc:>4}  {}", instruction.render(&self.config.registers));
        }

        match self.execute(pc, instruction)? {
            Flow::Next => self.pc = pc + 1,
            Flow::Jump(target) => self.pc = target,
            Flow::Halt => self.pc = self.program.len() as i64,
            Flow::Suspend => return Ok(Some(self.finish(Exit::AwaitingInput))),
        }
        self.steps += 1;
        self.profile[instruction.opcode().index()] += 1;
        Ok(None)
    }

    fn finish(&mut self, exit: Exit) -> Exit {
        self.status = match exit {
            Exit::Halted => Status::Halted,
            Exit::AwaitingInput => Status::AwaitingInput,
            Exit::Cancelled => Status::Cancelled,
        };
        debug!("{exit:?} at pc {} after {} steps", self.pc, self.steps);
        exit
    }

    fn notify(&mut self, pc: i64, cancel: &CancelToken) {
        if let Some(listeners) = self.listeners.get_mut(&pc) {
            let probe = Probe {
                pc,
                registers: &self.registers,
                names: &self.config.registers,
                cancel,
            };
            for listener in listeners.iter_mut() {
                listener(&probe);
            }
        }
    }

    fn execute(&mut self, pc: i64, instruction: Instruction) -> Result<Flow, VmError> {
        let opcode = instruction.opcode();
        let [a, b, c] = instruction.slots();
        let overflow = move || VmError::Overflow {
            pc,
            opcode: opcode.mnemonic(),
        };

        let flow = match opcode {
            // COPY: dst = src
            Opcode::Copy => {
                let value = self.value(a);
                self.store(b, value)
            }
            // INC / DEC: dst += 1, dst -= 1
            Opcode::Inc => self.modify(a, |x| x.checked_add(1).ok_or_else(overflow))?,
            Opcode::Dec => self.modify(a, |x| x.checked_sub(1).ok_or_else(overflow))?,
            // ADD: dst += rhs
            Opcode::Add => {
                let rhs = self.value(b);
                self.modify(a, |x| x.checked_add(rhs).ok_or_else(overflow))?
            }
            // SUB: dst -= rhs
            Opcode::Sub => {
                let rhs = self.value(b);
                self.modify(a, |x| x.checked_sub(rhs).ok_or_else(overflow))?
            }
            // MUL: dst *= rhs
            Opcode::Mul => {
                let rhs = self.value(b);
                self.modify(a, |x| x.checked_mul(rhs).ok_or_else(overflow))?
            }
            // DIV / MOD: dst /= rhs, dst %= rhs (truncating)
            Opcode::Div | Opcode::Mod => {
                let rhs = self.value(b);
                if rhs == 0 {
                    return Err(VmError::DivisionByZero { pc });
                }
                self.modify(a, |x| {
                    let result = if opcode == Opcode::Div {
                        x.checked_div(rhs)
                    } else {
                        x.checked_rem(rhs)
                    };
                    result.ok_or_else(overflow)
                })?
            }
            // HLF / TPL: dst /= 2, dst *= 3
            Opcode::Half => self.modify(a, |x| Ok(x / 2))?,
            Opcode::Triple => self.modify(a, |x| x.checked_mul(3).ok_or_else(overflow))?,

            // JMP: pc = target(offset)
            Opcode::Jmp => Flow::Jump(self.target(pc, opcode, a)?),
            // JNZ / JGZ / JIE / JIO: jump when cond is nonzero, positive, even, one
            Opcode::Jnz => self.branch(pc, opcode, self.value(a) != 0, b)?,
            Opcode::Jgz => self.branch(pc, opcode, self.value(a) > 0, b)?,
            Opcode::Jie => self.branch(pc, opcode, self.value(a) & 1 == 0, b)?,
            Opcode::Jio => self.branch(pc, opcode, self.value(a) == 1, b)?,

            // TGL: toggle program[pc + offset], always relative
            Opcode::Tgl => {
                let offset = self.value(a);
                if let Some(address) = pc.checked_add(offset) {
                    if self.program.toggle(address) {
                        debug!("pc {pc} toggled {address} into `{}`", self.program[address as usize].opcode());
                    }
                }
                Flow::Next
            }

            // IN: dst = input.pop(), suspend when empty
            Opcode::In => match self.input.pop_front() {
                Some(value) => self.store(a, value),
                None => Flow::Suspend,
            },
            // OUT: output.push(src)
            Opcode::Out => {
                let value = self.value(a);
                self.output.push_back(value);
                Flow::Next
            }

            // AND / OR / XOR: dst = lhs op rhs
            Opcode::And => {
                let value = self.value(a) & self.value(b);
                self.store(c, value)
            }
            Opcode::Or => {
                let value = self.value(a) | self.value(b);
                self.store(c, value)
            }
            Opcode::Xor => {
                let value = self.value(a) ^ self.value(b);
                self.store(c, value)
            }
            // NOT: dst = !src
            Opcode::Not => {
                let value = !self.value(a);
                self.store(b, value)
            }
            // SHL / SHR: dst = src << amount, src >> amount
            Opcode::Shl | Opcode::Shr => {
                let amount = self.value(b);
                let shift = u32::try_from(amount)
                    .ok()
                    .filter(|&s| s < i64::BITS)
                    .ok_or(VmError::InvalidShift { pc, amount })?;
                let value = self.value(a);
                let value = if opcode == Opcode::Shl {
                    value << shift
                } else {
                    value >> shift
                };
                self.store(c, value)
            }

            // EQ / LT / GT: dst = 1 if the relation holds, else 0
            Opcode::Eq => {
                let value = i64::from(self.value(a) == self.value(b));
                self.store(c, value)
            }
            Opcode::Lt => {
                let value = i64::from(self.value(a) < self.value(b));
                self.store(c, value)
            }
            Opcode::Gt => {
                let value = i64::from(self.value(a) > self.value(b));
                self.store(c, value)
            }

            // LOAD: dst = memory[addr]
            Opcode::Load => {
                let value = self.memory.read(self.value(a));
                self.store(b, value)
            }
            // STORE: memory[addr] = src
            Opcode::Store => {
                let value = self.value(a);
                let address = self.value(b);
                self.memory.write(address, value);
                Flow::Next
            }

            // NOP
            Opcode::Nop => Flow::Next,
            // HALT: pc = len
            Opcode::Halt => Flow::Halt,
        };
        Ok(flow)
    }

    #[inline(always)]
    fn value(&self, operand: Operand) -> i64 {
        match operand {
            Operand::Literal(value) => value,
            Operand::Reg(id) => self.registers.get(id),
        }
    }

    #[inline(always)]
    fn set(&mut self, id: RegisterId, value: i64) {
        let value = match self.config.word_mask {
            Some(mask) => value & mask,
            None => value,
        };
        self.registers.set(id, value);
    }

    /// Write `value` to `dst`. A literal destination can only appear after
    /// self-modification; such an instruction is skipped.
    fn store(&mut self, dst: Operand, value: i64) -> Flow {
        if let Operand::Reg(id) = dst {
            self.set(id, value);
        }
        Flow::Next
    }

    /// `dst <- f(dst)`, skipped for a literal destination.
    fn modify<F>(&mut self, dst: Operand, f: F) -> Result<Flow, VmError>
    where
        F: FnOnce(i64) -> Result<i64, VmError>,
    {
        if let Operand::Reg(id) = dst {
            let value = f(self.registers.get(id))?;
            self.set(id, value);
        }
        Ok(Flow::Next)
    }

    fn target(&self, pc: i64, opcode: Opcode, offset: Operand) -> Result<i64, VmError> {
        let offset = self.value(offset);
        match self.config.jump_mode {
            JumpMode::Relative => pc.checked_add(offset).ok_or(VmError::Overflow {
                pc,
                opcode: opcode.mnemonic(),
            }),
            JumpMode::Absolute => Ok(offset),
        }
    }

    fn branch(&self, pc: i64, opcode: Opcode, taken: bool, offset: Operand) -> Result<Flow, VmError> {
        if taken {
            Ok(Flow::Jump(self.target(pc, opcode, offset)?))
        } else {
            Ok(Flow::Next)
        }
    }

    // --- registers ---

    fn resolve(&self, name: &str) -> Result<RegisterId, VmError> {
        self.config
            .registers
            .resolve(name)
            .ok_or_else(|| VmError::InvalidRegister(name.to_string()))
    }

    pub fn read_register(&self, name: &str) -> Result<i64, VmError> {
        let id = self.resolve(name)?;
        Ok(self.registers.get(id))
    }

    /// Write a register by name. The word mask applies.
    pub fn write_register(&mut self, name: &str, value: i64) -> Result<(), VmError> {
        let id = self.resolve(name)?;
        self.set(id, value);
        Ok(())
    }

    pub fn register(&self, id: RegisterId) -> Option<i64> {
        self.config
            .registers
            .contains(id)
            .then(|| self.registers.get(id))
    }

    /// Every register with its source name, in declaration order.
    pub fn registers(&self) -> Vec<(String, i64)> {
        self.config
            .registers
            .ids()
            .map(|id| (self.config.registers.name(id), self.registers.get(id)))
            .collect()
    }

    // --- I/O queues (no-ops unless `io` is configured) ---

    pub fn enqueue_input(&mut self, value: i64) {
        if self.config.io {
            self.input.push_back(value);
        }
    }

    pub fn extend_input<I: IntoIterator<Item = i64>>(&mut self, values: I) {
        if self.config.io {
            self.input.extend(values);
        }
    }

    pub fn dequeue_output(&mut self) -> Option<i64> {
        self.output.pop_front()
    }

    pub fn drain_output(&mut self) -> Vec<i64> {
        self.output.drain(..).collect()
    }

    pub fn pending_input(&self) -> usize {
        self.input.len()
    }

    pub fn pending_output(&self) -> usize {
        self.output.len()
    }

    // --- auxiliary memory ---

    /// The auxiliary memory, if configured.
    pub fn memory(&self) -> Option<&Memory> {
        self.config.aux_memory.then_some(&self.memory)
    }

    pub fn read_memory(&self, address: i64) -> i64 {
        self.memory.read(address)
    }

    /// Ignored unless `aux_memory` is configured.
    pub fn write_memory(&mut self, address: i64, value: i64) {
        if self.config.aux_memory {
            self.memory.write(address, value);
        }
    }

    // --- hooks and inspection ---

    /// Call `listener` every time execution reaches `pc`, before the
    /// instruction there executes. Several listeners may share a PC; they
    /// run in registration order. A resumed `in` at `pc` notifies again.
    pub fn on_pc<F>(&mut self, pc: i64, listener: F)
    where
        F: FnMut(&Probe<'_>) + Send + 'static,
    {
        self.listeners.entry(pc).or_default().push(Box::new(listener));
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn pc(&self) -> i64 {
        self.pc
    }

    /// Instructions executed so far. A suspended `in` does not count.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// How many times an instruction with this opcode was executed.
    pub fn executions(&self, opcode: Opcode) -> u64 {
        self.profile[opcode.index()]
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("pc", &self.pc)
            .field("status", &self.status)
            .field("registers", &self.registers.values())
            .field("steps", &self.steps)
            .field("input", &self.input)
            .field("output", &self.output)
            .field("listeners", &self.listeners.values().map(Vec::len).sum::<usize>())
            .finish()
    }
}

/// Reject everything that can be rejected before the first instruction runs.
fn validate(program: &Program, config: &MachineConfig) -> Result<(), VmError> {
    for (pc, instruction) in program.iter().enumerate() {
        let malformed = |reason: String| VmError::Malformed { pc, reason };
        let opcode = instruction.opcode();

        let missing = match opcode.capability() {
            Capability::Io if !config.io => Some("io"),
            Capability::SelfModify if !config.self_modifying => Some("self-modification"),
            Capability::Memory if !config.aux_memory => Some("auxiliary memory"),
            _ => None,
        };
        if let Some(feature) = missing {
            return Err(malformed(format!("`{opcode}` requires {feature} support")));
        }

        for id in instruction.operands().iter().filter_map(|o| o.register()) {
            if !config.registers.contains(id) {
                return Err(malformed(format!(
                    "register {id} is outside the {}-register set",
                    config.registers.len()
                )));
            }
        }

        if !instruction.writes_register() {
            return Err(malformed(format!("`{opcode}` must write to a register")));
        }

        match (opcode, instruction.slots()) {
            (Opcode::Div | Opcode::Mod, [_, Operand::Literal(0), _]) => {
                return Err(malformed(format!("`{opcode}` by literal zero")));
            }
            (Opcode::Shl | Opcode::Shr, [_, Operand::Literal(amount), _])
                if !(0..i64::from(i64::BITS)).contains(&amount) =>
            {
                return Err(malformed(format!("shift amount {amount} out of range")));
            }
            _ => {}
        }
    }
    Ok(())
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn ins(opcode: Opcode, operands: &[Operand]) -> Instruction {
        Instruction::new(opcode, operands).unwrap()
    }

    /// Registers a..d only, so e..h must stay zero.
    fn arb_register() -> impl Strategy<Value = Operand> {
        (0u8..4).prop_map(|r| Operand::Reg(RegisterId::new(r)))
    }

    fn arb_operand() -> impl Strategy<Value = Operand> {
        prop_oneof![(-5i64..5).prop_map(Operand::Literal), arb_register()]
    }

    fn arb_instruction() -> impl Strategy<Value = Instruction> {
        prop_oneof![
            (arb_operand(), arb_register()).prop_map(|(s, d)| ins(Opcode::Copy, &[s, d])),
            arb_register().prop_map(|d| ins(Opcode::Inc, &[d])),
            arb_register().prop_map(|d| ins(Opcode::Dec, &[d])),
            (arb_register(), arb_operand()).prop_map(|(d, s)| ins(Opcode::Add, &[d, s])),
            (arb_register(), arb_operand()).prop_map(|(d, s)| ins(Opcode::Mul, &[d, s])),
            (arb_operand(), -6i64..6).prop_map(|(c, o)| ins(Opcode::Jnz, &[c, Operand::Literal(o)])),
            (arb_operand(), -6i64..6).prop_map(|(c, o)| ins(Opcode::Jgz, &[c, Operand::Literal(o)])),
            (-4i64..4).prop_map(|o| ins(Opcode::Tgl, &[Operand::Literal(o)])),
            arb_operand().prop_map(|s| ins(Opcode::Out, &[s])),
        ]
    }

    fn config() -> MachineConfig {
        MachineConfig {
            registers: RegisterSet::Letters(8),
            io: true,
            self_modifying: true,
            step_limit: Some(500),
            ..MachineConfig::default()
        }
    }

    fn run(program: &[Instruction]) -> (Machine, Result<Exit, VmError>) {
        let mut m = Machine::new(Program::new(program.to_vec()), config()).unwrap();
        let exit = m.run_to_end();
        (m, exit)
    }

    proptest! {
        #[test]
        fn identical_runs_agree(program in prop::collection::vec(arb_instruction(), 0..24)) {
            let (mut first, first_exit) = run(&program);
            let (mut second, second_exit) = run(&program);
            prop_assert_eq!(first_exit, second_exit);
            prop_assert_eq!(first.registers(), second.registers());
            prop_assert_eq!(first.drain_output(), second.drain_output());
            prop_assert_eq!(first.pc(), second.pc());
        }

        #[test]
        fn halted_means_pc_out_of_range(program in prop::collection::vec(arb_instruction(), 0..24)) {
            let (m, exit) = run(&program);
            let len = program.len() as i64;
            if exit == Ok(Exit::Halted) {
                prop_assert!(m.pc() < 0 || m.pc() >= len);
            }
            if exit == Ok(Exit::Cancelled) {
                prop_assert!((0..len).contains(&m.pc()));
                prop_assert_eq!(m.steps(), 500);
            }
            prop_assert!(m.steps() <= 500);
            prop_assert_eq!(m.program().len(), program.len());
        }

        #[test]
        fn untouched_registers_stay_zero(program in prop::collection::vec(arb_instruction(), 0..24)) {
            let (m, _) = run(&program);
            for name in ["e", "f", "g", "h"] {
                prop_assert_eq!(m.read_register(name), Ok(0));
            }
        }
    }
}

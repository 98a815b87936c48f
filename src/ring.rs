use log::debug;

use crate::error::VmError;
use crate::machine::{CancelToken, Machine, Status};

/// Why [`Ring::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingExit {
    /// Every machine reached a terminal state on its own: halted, or hit its
    /// step limit.
    Finished,
    /// The cancel token passed to [`Ring::run`] was set.
    Cancelled,
    /// A full round executed nothing: every live machine waits on input
    /// nobody will send.
    Deadlock,
}

/// Machines wired output-to-input and driven round-robin.
///
/// Machine `i` feeds machine `i + 1`. With feedback the last machine feeds
/// the first; without it the last machine's output is collected in
/// [`Ring::sink`]. Each machine runs until it suspends or stops before the
/// next one gets a turn.
pub struct Ring {
    machines: Vec<Machine>,
    feedback: bool,
    sent: Vec<u64>,
    last_sent: Vec<Option<i64>>,
    sink: Vec<i64>,
}

impl Ring {
    pub fn new(machines: Vec<Machine>, feedback: bool) -> Self {
        let n = machines.len();
        Self {
            machines,
            feedback,
            sent: vec![0; n],
            last_sent: vec![None; n],
            sink: Vec::new(),
        }
    }

    /// A linear chain: no feedback.
    pub fn chain(machines: Vec<Machine>) -> Self {
        Self::new(machines, false)
    }

    /// A closed loop: the last machine feeds the first.
    pub fn looped(machines: Vec<Machine>) -> Self {
        Self::new(machines, true)
    }

    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }

    pub fn machine(&self, index: usize) -> &Machine {
        &self.machines[index]
    }

    pub fn machine_mut(&mut self, index: usize) -> &mut Machine {
        &mut self.machines[index]
    }

    /// Number of values machine `index` has emitted.
    pub fn sent(&self, index: usize) -> u64 {
        self.sent[index]
    }

    /// The most recent value machine `index` emitted.
    pub fn last_sent(&self, index: usize) -> Option<i64> {
        self.last_sent[index]
    }

    /// Output of the last machine of a chain.
    pub fn sink(&self) -> &[i64] {
        &self.sink
    }

    /// Round-robin until every machine stops or nothing can make progress.
    /// The first machine error aborts the whole ring.
    pub fn run(&mut self, cancel: &CancelToken) -> Result<RingExit, VmError> {
        let n = self.machines.len();
        let mut rounds: u64 = 0;
        loop {
            rounds += 1;
            let mut progressed = false;
            for i in 0..n {
                let before = self.machines[i].steps();
                self.machines[i].run(cancel)?;
                progressed |= self.machines[i].steps() != before;

                let outputs = self.machines[i].drain_output();
                if let Some(&last) = outputs.last() {
                    self.last_sent[i] = Some(last);
                }
                self.sent[i] += outputs.len() as u64;
                if self.feedback || i + 1 < n {
                    self.machines[(i + 1) % n].extend_input(outputs);
                } else {
                    self.sink.extend(outputs);
                }
            }

            if cancel.is_cancelled() {
                debug!("ring of {n} cancelled after {rounds} rounds");
                return Ok(RingExit::Cancelled);
            }
            let stopped = self
                .machines
                .iter()
                .all(|m| matches!(m.status(), Status::Halted | Status::Cancelled));
            if stopped {
                debug!("ring of {n} finished after {rounds} rounds");
                return Ok(RingExit::Finished);
            }
            if !progressed {
                debug!("ring of {n} deadlocked after {rounds} rounds");
                return Ok(RingExit::Deadlock);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::Dialect;

    fn load(dialect: Dialect, source: &str) -> Machine {
        Machine::new(dialect.decode(source).unwrap(), dialect.config()).unwrap()
    }

    #[test]
    fn test_duet_pair_deadlocks() {
        let source = "snd 1\nsnd 2\nsnd p\nrcv a\nrcv b\nrcv c\nrcv d";
        let machines = (0..2)
            .map(|p| {
                let mut m = load(Dialect::Duet, source);
                m.write_register("p", p).unwrap();
                m
            })
            .collect();
        let mut ring = Ring::looped(machines);
        assert_eq!(ring.run(&CancelToken::new()), Ok(RingExit::Deadlock));
        assert_eq!(ring.sent(0), 3);
        assert_eq!(ring.sent(1), 3);
        assert_eq!(ring.machine(0).read_register("c"), Ok(1));
        assert_eq!(ring.machine(1).read_register("c"), Ok(0));
    }

    #[test]
    fn test_amplifier_chain() {
        let source = "in p\nin x\nmul x 2\nadd x p\nout x";
        let machines = (1..=3)
            .map(|phase| {
                let mut m = load(Dialect::Canonical, source);
                m.enqueue_input(phase);
                m
            })
            .collect();
        let mut ring = Ring::chain(machines);
        ring.machine_mut(0).enqueue_input(0);
        assert_eq!(ring.run(&CancelToken::new()), Ok(RingExit::Finished));
        // 0*2+1 = 1, 1*2+2 = 4, 4*2+3 = 11
        assert_eq!(ring.sink(), &[11]);
        assert_eq!(ring.last_sent(1), Some(4));
    }

    #[test]
    fn test_feedback_loop_finishes() {
        let source = "\
copy 5 c
in x
add x 1
out x
dec c
jnz c -4";
        let machines = vec![load(Dialect::Canonical, source), load(Dialect::Canonical, source)];
        let mut ring = Ring::looped(machines);
        ring.machine_mut(0).enqueue_input(0);
        assert_eq!(ring.run(&CancelToken::new()), Ok(RingExit::Finished));
        assert_eq!(ring.sent(0), 5);
        assert_eq!(ring.sent(1), 5);
        assert_eq!(ring.last_sent(0), Some(9));
        assert_eq!(ring.last_sent(1), Some(10));
        assert!(ring.sink().is_empty());
    }

    #[test]
    fn test_errors_abort_the_ring() {
        let machines = vec![
            load(Dialect::Canonical, "out 1"),
            load(Dialect::Canonical, "in a\ndiv a b"),
        ];
        let mut ring = Ring::chain(machines);
        assert_eq!(
            ring.run(&CancelToken::new()),
            Err(VmError::DivisionByZero { pc: 1 })
        );
    }

    #[test]
    fn test_cancel_stops_the_ring() {
        let source = "in x\nout x\njmp -2";
        let mut machines = vec![load(Dialect::Canonical, source), load(Dialect::Canonical, source)];
        let cancel = CancelToken::new();
        let stop = cancel.clone();
        machines[1].on_pc(1, move |probe| {
            if probe.read("x") == Some(3) {
                stop.cancel();
            }
        });
        let mut ring = Ring::looped(machines);
        ring.machine_mut(0).enqueue_input(3);
        assert_eq!(ring.run(&cancel), Ok(RingExit::Cancelled));
        assert_eq!(ring.machine(1).status(), Status::Cancelled);
        assert_eq!(ring.sent(1), 1);
    }

    #[test]
    fn test_empty_ring_finishes() {
        let mut ring = Ring::chain(Vec::new());
        assert!(ring.is_empty());
        assert_eq!(ring.run(&CancelToken::new()), Ok(RingExit::Finished));
    }
}

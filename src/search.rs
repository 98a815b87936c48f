//! Parallel brute force over machine configurations.
//!
//! Each candidate gets its own freshly built machine, run on a rayon worker
//! until its first exit. Candidates whose build or run fails are discarded.

use std::ops::Range;

use log::debug;
use rayon::prelude::*;

use crate::error::VmError;
use crate::machine::{Exit, Machine};

/// The lowest candidate whose machine is accepted, if any.
pub fn lowest<B, A>(candidates: Range<i64>, build: B, accept: A) -> Option<i64>
where
    B: Fn(i64) -> Result<Machine, VmError> + Sync,
    A: Fn(&mut Machine, Exit) -> bool + Sync,
{
    candidates
        .into_par_iter()
        .find_first(|&candidate| evaluate(candidate, &build, &accept).unwrap_or(false))
}

/// Every candidate for which `extract` returns a value, in candidate order.
pub fn sweep<B, F, T>(candidates: Range<i64>, build: B, extract: F) -> Vec<(i64, T)>
where
    B: Fn(i64) -> Result<Machine, VmError> + Sync,
    F: Fn(&mut Machine, Exit) -> Option<T> + Sync,
    T: Send,
{
    let mut found: Vec<(i64, T)> = candidates
        .into_par_iter()
        .filter_map(|candidate| {
            evaluate(candidate, &build, &extract)
                .flatten()
                .map(|value| (candidate, value))
        })
        .collect();
    found.sort_by_key(|(candidate, _)| *candidate);
    found
}

fn evaluate<B, F, T>(candidate: i64, build: &B, judge: &F) -> Option<T>
where
    B: Fn(i64) -> Result<Machine, VmError>,
    F: Fn(&mut Machine, Exit) -> T,
{
    let result = build(candidate).and_then(|mut machine| {
        let exit = machine.run_to_end()?;
        Ok(judge(&mut machine, exit))
    });
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            debug!("candidate {candidate} discarded: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::Dialect;
    use crate::machine::MachineConfig;

    fn build(source: &'static str, config: MachineConfig) -> impl Fn(i64) -> Result<Machine, VmError> + Sync {
        move |a| {
            let program = Dialect::Canonical
                .decode(source)
                .map_err(|e| VmError::Malformed {
                    pc: 0,
                    reason: e.to_string(),
                })?;
            Machine::with_registers(program, config.clone(), [("a", a)])
        }
    }

    #[test]
    fn test_lowest_square_above_threshold() {
        let found = lowest(
            0..100,
            build("copy a b\nmul b a", Dialect::Canonical.config()),
            |m, exit| exit == Exit::Halted && m.read_register("b").unwrap_or(0) >= 50,
        );
        assert_eq!(found, Some(8));
    }

    #[test]
    fn test_failed_runs_are_discarded() {
        // a = 0 divides by zero; -4 gives -25.
        let found = lowest(
            -10..10,
            build("copy 100 b\ndiv b a", Dialect::Canonical.config()),
            |m, _| m.read_register("b") == Ok(25),
        );
        assert_eq!(found, Some(4));
    }

    #[test]
    fn test_failed_builds_are_discarded() {
        let found = lowest(
            0..10,
            |a| {
                if a % 2 == 1 {
                    Machine::new(
                        Dialect::Canonical.decode("out a").unwrap(),
                        MachineConfig::default(),
                    )
                } else {
                    Machine::new(Dialect::Canonical.decode("").unwrap(), MachineConfig::default())
                }
            },
            |_, exit| exit == Exit::Halted,
        );
        assert_eq!(found, Some(0));

        let found = lowest(
            1..2,
            |_| {
                Machine::new(
                    Dialect::Canonical.decode("out a").unwrap(),
                    MachineConfig::default(),
                )
            },
            |_, _| true,
        );
        assert_eq!(found, None);
    }

    #[test]
    fn test_lowest_clock_signal() {
        // Emits the bits of `a`, least significant first, forever.
        let source = "\
copy a b
copy b c
mod c 2
out c
div b 2
jnz b -4
jmp -6";
        let config = MachineConfig {
            step_limit: Some(300),
            ..Dialect::Canonical.config()
        };
        let found = lowest(0..64, build(source, config), |m, exit| {
            let signal = m.drain_output();
            exit == Exit::Cancelled
                && signal.len() >= 10
                && signal.iter().enumerate().all(|(i, &bit)| bit == (i % 2) as i64)
        });
        assert_eq!(found, Some(2));
    }

    #[test]
    fn test_sweep_in_candidate_order() {
        let squares = sweep(
            0..6,
            build("copy a b\nmul b b", Dialect::Canonical.config()),
            |m, _| m.read_register("b").ok(),
        );
        assert_eq!(
            squares,
            vec![(0, 0), (1, 1), (2, 4), (3, 9), (4, 16), (5, 25)]
        );
    }
}

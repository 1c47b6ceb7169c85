use fastrand::Rng;
use tracing::debug;

use crate::prelude::*;

/// Generates a system with one random procedure per call symbol, the initial procedure is drawn
/// uniformly. Each procedure consists of `procedure_size - 2` accepting states with a transition
/// for every symbol of the procedural alphabet to a uniformly drawn target. From each of those
/// states, the return symbol leads to an accepting success state with probability one half.
/// Finally, every procedure is completed with a rejecting sink, so that it has exactly
/// `procedure_size` states.
///
/// # Panics
/// If `procedure_size <= 2` or the alphabet has no call symbols.
pub fn random_sba<I: Symbol>(
    alphabet: &SbaAlphabet<I>,
    procedure_size: usize,
    rng: &mut Rng,
) -> StackSba<I> {
    assert!(procedure_size > 2, "procedures need more than two states");
    let procedural = alphabet.procedural_symbols().collect::<Vec<_>>();

    let procedures = alphabet
        .calls()
        .iter()
        .map(|call| {
            let mut dfa = Dfa::new();
            for _ in 0..procedure_size - 2 {
                dfa.add_state(true);
            }
            dfa.set_initial(0);
            for q in 0..procedure_size - 2 {
                for sym in &procedural {
                    let target = rng.usize(..procedure_size - 2);
                    dfa.add_edge(q, *sym, target);
                }
            }
            (*call, finish_procedure(alphabet, dfa, rng))
        })
        .collect::<Vec<_>>();

    let initial = draw_initial(alphabet, rng);
    debug!("generated random system with initial procedure {}", initial.show());
    StackSba::new(alphabet.clone(), Some(initial), procedures)
}

/// Works as [`random_sba`], but procedures are partial: every transition of the procedural
/// alphabet is present only with probability one half, which usually leaves some states
/// unreachable and makes the procedures more diverse.
///
/// # Panics
/// If `procedure_size <= 2` or the alphabet has no call symbols.
pub fn random_partial_sba<I: Symbol>(
    alphabet: &SbaAlphabet<I>,
    procedure_size: usize,
    rng: &mut Rng,
) -> StackSba<I> {
    assert!(procedure_size > 2, "procedures need more than two states");

    let procedures = alphabet
        .calls()
        .iter()
        .map(|call| (*call, random_procedure(alphabet, procedure_size, rng)))
        .collect::<Vec<_>>();

    let initial = draw_initial(alphabet, rng);
    debug!(
        "generated random partial system with initial procedure {}",
        initial.show()
    );
    StackSba::new(alphabet.clone(), Some(initial), procedures)
}

/// Draws a single partial procedure as used by [`random_partial_sba`], completed with a sink.
pub fn random_procedure<I: Symbol>(
    alphabet: &SbaAlphabet<I>,
    procedure_size: usize,
    rng: &mut Rng,
) -> Dfa<I> {
    let states = procedure_size - 2;
    let mut dfa = Dfa::new();
    dfa.add_initial_state(true);
    for _ in 1..states {
        dfa.add_state(true);
    }

    for q in 0..states {
        for sym in alphabet.procedural_symbols() {
            if rng.bool() {
                let target = rng.usize(..states);
                dfa.add_edge(q, sym, target);
            }
        }
    }

    finish_procedure(alphabet, dfa, rng)
}

/// Generates a system in which the procedures form a chain: after shuffling the call symbols, the
/// `i`-th procedure first calls the next one and then has to read a fixed sequence of internal
/// symbols before it may return. The last procedure of the chain reads internal symbols only.
/// Learning such a system requires discovering the procedures one after another.
///
/// # Panics
/// If `procedure_size <= 2`, or the alphabet has no call symbols or no internal symbols.
pub fn keylock_sba<I: Symbol>(
    alphabet: &SbaAlphabet<I>,
    procedure_size: usize,
    rng: &mut Rng,
) -> StackSba<I> {
    assert!(procedure_size > 2, "procedures need more than two states");
    assert!(
        !alphabet.internals().is_empty(),
        "keylock systems need internal symbols"
    );

    let internals = alphabet.internals();
    let mut calls = alphabet.calls().to_vec();
    rng.shuffle(&mut calls);

    let mut procedures = Vec::with_capacity(calls.len());
    for (i, call) in calls.iter().enumerate() {
        let mut dfa = Dfa::new();
        dfa.add_initial_state(true);
        for _ in 0..procedure_size {
            dfa.add_state(true);
        }

        let first = match calls.get(i + 1) {
            Some(next) => *next,
            None => internals[rng.usize(..internals.len())],
        };
        dfa.add_edge(0, first, 1);
        for q in 1..procedure_size - 1 {
            dfa.add_edge(q, internals[rng.usize(..internals.len())], q + 1);
        }
        dfa.add_edge(procedure_size - 1, alphabet.return_symbol(), procedure_size);

        dfa.complete(alphabet.universe());
        procedures.push((*call, dfa));
    }

    StackSba::new(alphabet.clone(), calls.first().copied(), procedures)
}

fn finish_procedure<I: Symbol>(
    alphabet: &SbaAlphabet<I>,
    mut dfa: Dfa<I>,
    rng: &mut Rng,
) -> Dfa<I> {
    let states = dfa.size();
    let success = dfa.add_state(true);
    for q in 0..states {
        if rng.bool() {
            dfa.add_edge(q, alphabet.return_symbol(), success);
        }
    }
    debug_assert!(dfa.is_prefix_closed());
    dfa.complete(alphabet.universe());
    dfa
}

fn draw_initial<I: Symbol>(alphabet: &SbaAlphabet<I>, rng: &mut Rng) -> I {
    let calls = alphabet.calls();
    assert!(!calls.is_empty(), "the alphabet has no call symbols");
    calls[rng.usize(..calls.len())]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn integer_alphabet() -> SbaAlphabet<u32> {
        SbaAlphabet::new(10..16, 0..4, 26).unwrap()
    }

    #[test_log::test]
    fn random_systems() {
        let alphabet = integer_alphabet();
        for seed in 0..10 {
            let sba = random_sba(&alphabet, 6, &mut Rng::with_seed(seed));
            assert_eq!(sba.size(), 4 * 6);
            for (_, procedure) in sba.procedures() {
                assert!(procedure.is_prefix_closed());
                assert!(procedure.is_accepting(procedure.initial().unwrap()));
            }
            assert!(sba.accepts(&[sba.initial_procedure().unwrap()]));

            let partial = random_partial_sba(&alphabet, 6, &mut Rng::with_seed(seed));
            for (_, procedure) in partial.procedures() {
                assert!(procedure.is_prefix_closed());
                assert!(procedure.size() <= 6);
            }
        }
    }

    #[test]
    fn seeded_generation_is_reproducible() {
        let alphabet = integer_alphabet();
        let first = random_partial_sba(&alphabet, 5, &mut Rng::with_seed(69));
        let second = random_partial_sba(&alphabet, 5, &mut Rng::with_seed(69));
        assert_eq!(first.initial_procedure(), second.initial_procedure());
        for (call, procedure) in first.procedures() {
            assert_eq!(Some(procedure), second.procedure(call));
        }
        assert!(crate::equivalence::equivalent(&first, &second));
    }

    #[test]
    fn keylock_chain() {
        let alphabet = SbaAlphabet::new(['a'], ['S', 'T'], 'R').unwrap();
        let sba = keylock_sba(&alphabet, 3, &mut Rng::with_seed(7));
        let first = sba.initial_procedure().unwrap();
        let second = if first == 'S' { 'T' } else { 'S' };

        assert_eq!(sba.size(), 2 * 5);
        assert!(sba.accepts(&[first, second, 'a', 'a', 'R', 'a', 'R']));
        assert!(!sba.accepts(&[first, 'a']));
        assert!(!sba.accepts(&[first, second, 'R']));
    }
}

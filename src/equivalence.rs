use std::collections::VecDeque;

use tracing::{debug, trace};

use crate::{
    alphabet::SymbolType,
    dfa::{Acceptor, StateIndex},
    math::{Map, OrderedMap, Set},
    sba::Sba,
    Show, Symbol,
};

/// Searches for a word on which `left` and `right` disagree. Both systems must be defined over
/// the same alphabet. The returned word is accepted by exactly one of the two systems, while each
/// of its proper prefixes is either accepted by both or rejected by both. Returns `None` if the
/// systems are equivalent.
///
/// Procedures may start in a rejecting state. Entering such a procedure is rejected, but reading
/// on from there may be accepted again, so the search also follows calls into rejecting entries.
///
/// Procedures are compared pairwise: for each procedure that both systems can enter, the pairs
/// of local states that are jointly reachable (using nested invocations of procedures that are
/// known to terminate in both systems) are explored until a symbol is found on which the pair
/// disagrees. Exploring procedures yields new access words and terminating words, which in turn
/// make further pairs reachable, so the exploration is repeated until nothing changes anymore.
///
/// # Example
/// ```
/// use sba::prelude::*;
///
/// let alphabet = SbaAlphabet::new(['a', 'b'], ['S'], 'R').unwrap();
/// let left = StackSba::new(
///     alphabet.clone(),
///     Some('S'),
///     [('S', Dfa::builder().default_color(true).with_edges([(0, 'a', 0), (0, 'R', 1)]).into_dfa(0))],
/// );
/// let right = StackSba::new(
///     alphabet,
///     Some('S'),
///     [('S', Dfa::builder().default_color(true).with_edges([(0, 'a', 1), (1, 'a', 0), (0, 'R', 2), (1, 'R', 2)]).into_dfa(0))],
/// );
/// assert!(equivalent(&left, &right));
/// ```
pub fn find_separating_word<I, L, R>(left: &L, right: &R) -> Option<Vec<I>>
where
    I: Symbol,
    L: Sba<Symbol = I>,
    R: Sba<Symbol = I>,
{
    let alphabet = left.alphabet();
    debug_assert!(
        alphabet == right.alphabet(),
        "systems must be defined over the same alphabet"
    );

    let mut access: OrderedMap<I, Vec<I>> = OrderedMap::default();
    let mut terminating: Map<I, Vec<I>> = Map::default();

    for sym in alphabet.universe() {
        let word = [sym];
        let (l, r) = (left.reached_state(&word), right.reached_state(&word));
        if left.is_accepting(&l) != right.is_accepting(&r) {
            debug!("systems disagree on {}", word.show());
            return Some(word.to_vec());
        }
        if !alphabet.is_call(sym) {
            continue;
        }
        let separating = match (l.is_sink(), r.is_sink()) {
            (false, false) => {
                access.insert(sym, word.to_vec());
                None
            }
            (false, true) => one_sided(left, &[], sym),
            (true, false) => one_sided(right, &[], sym),
            (true, true) => None,
        };
        if let Some(word) = separating {
            debug!("systems disagree on {}", word.show());
            return Some(word);
        }
    }

    loop {
        let known = (access.len(), terminating.len());
        let calls: Vec<I> = access.keys().copied().collect();
        for call in calls {
            if let Some(word) = explore(left, right, call, &mut access, &mut terminating) {
                debug!("systems disagree on {}", word.show());
                return Some(word);
            }
        }
        if known == (access.len(), terminating.len()) {
            trace!(
                "no separating word, explored {} procedures of which {} terminate",
                access.len(),
                terminating.len()
            );
            return None;
        }
    }
}

/// Returns true if `left` and `right` accept the same language, see [`find_separating_word`].
pub fn equivalent<I, L, R>(left: &L, right: &R) -> bool
where
    I: Symbol,
    L: Sba<Symbol = I>,
    R: Sba<Symbol = I>,
{
    find_separating_word(left, right).is_none()
}

fn accepting_successor<A: Acceptor>(
    procedure: &A,
    state: StateIndex,
    symbol: A::Symbol,
) -> Option<StateIndex> {
    procedure
        .successor(state, symbol)
        .filter(|q| procedure.is_accepting(*q))
}

/// Whether entering `call` leads to an accepting configuration, or `None` if it can not be
/// entered at all.
fn entry_acceptance<A: Sba + ?Sized>(sba: &A, call: A::Symbol) -> Option<bool> {
    let procedure = sba.procedure(call)?;
    let initial = procedure.initial()?;
    Some(procedure.is_accepting(initial))
}

/// Searches for a word that leads from entering `call` to an accepting configuration. Such a word
/// exists exactly when some run through the procedure, possibly after entering further procedures
/// with rejecting initial states, reaches an accepting local state or returns.
fn acceptance_witness<A: Sba + ?Sized>(sba: &A, call: A::Symbol) -> Option<Vec<A::Symbol>> {
    let alphabet = sba.alphabet();
    let mut witnesses: Map<A::Symbol, Vec<A::Symbol>> = Map::default();

    loop {
        let mut changed = false;
        for (c, procedure) in sba.procedures() {
            if witnesses.contains_key(&c) {
                continue;
            }
            let Some(entry) = procedure.initial() else {
                continue;
            };
            let found = if procedure.is_accepting(entry) {
                Some(vec![])
            } else {
                alphabet.universe().find_map(|sym| {
                    accepting_successor(&procedure, entry, sym)?;
                    match alphabet.symbol_type(sym)? {
                        SymbolType::Call => witnesses
                            .get(&sym)
                            .map(|w| [&[sym][..], w.as_slice()].concat()),
                        SymbolType::Internal | SymbolType::Return => Some(vec![sym]),
                    }
                })
            };
            if let Some(word) = found {
                witnesses.insert(c, word);
                changed = true;
            }
        }
        if !changed {
            return witnesses.remove(&call);
        }
    }
}

/// Handles a call after `prefix` which only `alive` survives, entering a rejecting initial state.
/// The other system is dead from here on, so the systems disagree iff `alive` accepts again.
fn one_sided<A: Sba + ?Sized>(
    alive: &A,
    prefix: &[A::Symbol],
    call: A::Symbol,
) -> Option<Vec<A::Symbol>> {
    let witness = acceptance_witness(alive, call)?;
    Some([prefix, &[call][..], witness.as_slice()].concat())
}

/// Explores the jointly reachable pairs of local states of `call`. Records newly found access and
/// terminating words and returns a separating word as soon as a disagreement is found.
fn explore<I, L, R>(
    left: &L,
    right: &R,
    call: I,
    access: &mut OrderedMap<I, Vec<I>>,
    terminating: &mut Map<I, Vec<I>>,
) -> Option<Vec<I>>
where
    I: Symbol,
    L: Sba<Symbol = I>,
    R: Sba<Symbol = I>,
{
    let alphabet = left.alphabet();
    let prefix = access.get(&call)?.clone();
    let (pl, pr) = (left.procedure(call)?, right.procedure(call)?);
    let start = (pl.initial()?, pr.initial()?);

    let mut seen = Set::from_iter([start]);
    let mut queue = VecDeque::from([(start, Vec::new())]);

    while let Some(((ql, qr), local)) = queue.pop_front() {
        for sym in alphabet.universe() {
            let separating = || [prefix.as_slice(), local.as_slice(), &[sym][..]].concat();
            let (sl, sr) = (
                accepting_successor(&pl, ql, sym),
                accepting_successor(&pr, qr, sym),
            );

            match alphabet.symbol_type(sym) {
                Some(SymbolType::Internal) => match (sl, sr) {
                    (Some(a), Some(b)) => {
                        if seen.insert((a, b)) {
                            queue.push_back(((a, b), [local.as_slice(), &[sym][..]].concat()));
                        }
                    }
                    (None, None) => {}
                    _ => return Some(separating()),
                },
                Some(SymbolType::Return) => match (sl, sr) {
                    (Some(_), Some(_)) => {
                        terminating.entry(call).or_insert_with(|| local.clone());
                    }
                    (None, None) => {}
                    _ => return Some(separating()),
                },
                Some(SymbolType::Call) => {
                    let el = sl.and_then(|_| entry_acceptance(left, sym));
                    let er = sr.and_then(|_| entry_acceptance(right, sym));
                    if el.unwrap_or(false) != er.unwrap_or(false) {
                        return Some(separating());
                    }
                    let caller = [prefix.as_slice(), local.as_slice()].concat();
                    let (Some(a), Some(b), Some(_), Some(_)) = (sl, sr, el, er) else {
                        // one side died, the other entered a rejecting initial state
                        let separating = match (el, er) {
                            (Some(_), None) => one_sided(left, &caller, sym),
                            (None, Some(_)) => one_sided(right, &caller, sym),
                            _ => None,
                        };
                        if separating.is_some() {
                            return separating;
                        }
                        continue;
                    };
                    access.entry(sym).or_insert_with(separating);
                    if let Some(term) = terminating.get(&sym) {
                        if seen.insert((a, b)) {
                            let expanded = [
                                local.as_slice(),
                                &[sym][..],
                                term.as_slice(),
                                &[alphabet.return_symbol()][..],
                            ]
                            .concat();
                            queue.push_back(((a, b), expanded));
                        }
                    }
                }
                None => {}
            }
        }
    }
    None
}

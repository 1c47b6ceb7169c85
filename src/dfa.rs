use std::{collections::VecDeque, fmt::Debug};

use itertools::Itertools;
use owo_colors::OwoColorize;

use crate::{
    math::{Map, Set},
    Symbol,
};

/// States of an acceptor are identified by their index.
pub type StateIndex = usize;

/// A deterministic finite acceptor, which may be partial. Undefined transitions are treated as
/// rejecting by all consumers of this trait. This is the view of a procedure that the stack
/// semantics of an SBA relies on.
pub trait Acceptor {
    /// The type of symbols the acceptor reads.
    type Symbol: Symbol;

    /// Returns the initial state, if there is one.
    fn initial(&self) -> Option<StateIndex>;

    /// Returns the successor of `state` on `symbol`, or `None` if the transition is undefined.
    fn successor(&self, state: StateIndex, symbol: Self::Symbol) -> Option<StateIndex>;

    /// Returns true if `state` is accepting.
    fn is_accepting(&self, state: StateIndex) -> bool;

    /// Returns the number of states.
    fn size(&self) -> usize;

    /// Returns the state that is reached when reading `word` from `state`, if every transition
    /// along the way is defined.
    fn reached_state_from(&self, state: StateIndex, word: &[Self::Symbol]) -> Option<StateIndex> {
        word.iter()
            .try_fold(state, |q, sym| self.successor(q, *sym))
    }

    /// Returns the state that is reached when reading `word` from the initial state.
    fn reached_state(&self, word: &[Self::Symbol]) -> Option<StateIndex> {
        self.reached_state_from(self.initial()?, word)
    }

    /// Returns true if reading `word` from the initial state leads to an accepting state.
    fn accepts(&self, word: &[Self::Symbol]) -> bool {
        self.reached_state(word)
            .map(|q| self.is_accepting(q))
            .unwrap_or(false)
    }
}

impl<A: Acceptor> Acceptor for &A {
    type Symbol = A::Symbol;
    fn initial(&self) -> Option<StateIndex> {
        A::initial(self)
    }
    fn successor(&self, state: StateIndex, symbol: Self::Symbol) -> Option<StateIndex> {
        A::successor(self, state, symbol)
    }
    fn is_accepting(&self, state: StateIndex) -> bool {
        A::is_accepting(self, state)
    }
    fn size(&self) -> usize {
        A::size(self)
    }
}

/// A (possibly partial) deterministic finite automaton. States are stored in a vector, each state
/// holds a map from symbols to the index of the successor state.
#[derive(Clone, PartialEq, Eq)]
pub struct Dfa<S: Symbol> {
    accepting: Vec<bool>,
    edges: Vec<Map<S, StateIndex>>,
    initial: Option<StateIndex>,
}

impl<S: Symbol> Default for Dfa<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Symbol> Dfa<S> {
    /// Creates an empty automaton without states.
    pub fn new() -> Self {
        Self {
            accepting: vec![],
            edges: vec![],
            initial: None,
        }
    }

    /// Returns a [`DfaBuilder`], which allows convenient construction of small automata.
    pub fn builder() -> DfaBuilder<S> {
        DfaBuilder::default()
    }

    /// Adds a new state with the given acceptance and returns its index.
    pub fn add_state(&mut self, accepting: bool) -> StateIndex {
        self.accepting.push(accepting);
        self.edges.push(Map::default());
        self.accepting.len() - 1
    }

    /// Adds a new state and makes it the initial state.
    pub fn add_initial_state(&mut self, accepting: bool) -> StateIndex {
        let q = self.add_state(accepting);
        self.initial = Some(q);
        q
    }

    /// Designates `state` as the initial state.
    pub fn set_initial(&mut self, state: StateIndex) {
        assert!(state < self.size(), "state {state} does not exist");
        self.initial = Some(state);
    }

    /// Changes the acceptance of `state`.
    pub fn set_accepting(&mut self, state: StateIndex, accepting: bool) {
        self.accepting[state] = accepting;
    }

    /// Inserts the transition from `source` to `target` on `symbol`, returning the previous
    /// target if the transition was already defined.
    pub fn add_edge(
        &mut self,
        source: StateIndex,
        symbol: S,
        target: StateIndex,
    ) -> Option<StateIndex> {
        assert!(
            source < self.size() && target < self.size(),
            "edge ({source}, {}, {target}) refers to non-existent state",
            symbol.show()
        );
        self.edges[source].insert(symbol, target)
    }

    /// Iterates over the indices of all states.
    pub fn states(&self) -> std::ops::Range<StateIndex> {
        0..self.size()
    }

    /// Iterates over the defined transitions leaving `state`, ordered by symbol.
    pub fn edges_from(&self, state: StateIndex) -> impl Iterator<Item = (S, StateIndex)> + '_ {
        self.edges[state]
            .iter()
            .map(|(sym, target)| (*sym, *target))
            .sorted()
    }

    /// Returns all symbols that appear on at least one transition, in ascending order.
    pub fn symbols(&self) -> Vec<S> {
        self.edges
            .iter()
            .flat_map(|map| map.keys().copied())
            .unique()
            .sorted()
            .collect()
    }

    /// Completes the automaton over `alphabet` by redirecting all undefined transitions to a new
    /// rejecting sink state. Returns the index of the sink, or `None` if the automaton already was
    /// complete and no sink was added.
    pub fn complete<I: IntoIterator<Item = S>>(&mut self, alphabet: I) -> Option<StateIndex> {
        let alphabet = alphabet.into_iter().collect_vec();
        let missing = self
            .states()
            .flat_map(|q| alphabet.iter().map(move |a| (q, *a)))
            .filter(|(q, a)| !self.edges[*q].contains_key(a))
            .collect_vec();

        if missing.is_empty() && self.initial.is_some() {
            return None;
        }

        let sink = self.add_state(false);
        for (q, a) in missing {
            self.add_edge(q, a, sink);
        }
        for a in alphabet {
            self.add_edge(sink, a, sink);
        }
        if self.initial.is_none() {
            self.initial = Some(sink);
        }
        Some(sink)
    }

    /// Computes the length-lexicographically minimal access word of every reachable state,
    /// where symbols are ordered as in `alphabet`. Only transitions on symbols of `alphabet` are
    /// considered. The result is ordered by discovery, so the initial state comes first.
    pub fn minimal_representatives(&self, alphabet: &[S]) -> Vec<(Vec<S>, StateIndex)> {
        let Some(initial) = self.initial else {
            return vec![];
        };

        let mut seen = Set::from_iter([initial]);
        let mut queue = VecDeque::from([(vec![], initial)]);
        let mut out = vec![];

        while let Some((access, q)) = queue.pop_front() {
            for sym in alphabet {
                if let Some(p) = self.successor(q, *sym) {
                    if seen.insert(p) {
                        let mut new_access = access.clone();
                        new_access.push(*sym);
                        queue.push_back((new_access, p));
                    }
                }
            }
            out.push((access, q));
        }
        out
    }

    /// Returns a state cover, that is a set of access words that reaches every reachable state
    /// exactly once. See [`Self::minimal_representatives`].
    pub fn state_cover(&self, alphabet: &[S]) -> Vec<Vec<S>> {
        self.minimal_representatives(alphabet)
            .into_iter()
            .map(|(access, _)| access)
            .collect()
    }

    /// Returns true if the accepted language is prefix closed, that is if no reachable rejecting
    /// state can reach an accepting state.
    pub fn is_prefix_closed(&self) -> bool {
        self.minimal_representatives(&self.symbols())
            .into_iter()
            .filter(|(_, q)| !self.is_accepting(*q))
            .all(|(_, q)| self.edges_from(q).all(|(_, p)| !self.is_accepting(p)))
    }
}

impl<S: Symbol> Acceptor for Dfa<S> {
    type Symbol = S;

    fn initial(&self) -> Option<StateIndex> {
        self.initial
    }

    fn successor(&self, state: StateIndex, symbol: S) -> Option<StateIndex> {
        self.edges.get(state)?.get(&symbol).copied()
    }

    fn is_accepting(&self, state: StateIndex) -> bool {
        self.accepting.get(state).copied().unwrap_or(false)
    }

    fn size(&self) -> usize {
        self.accepting.len()
    }
}

impl<S: Symbol> Debug for Dfa<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let symbols = self.symbols();
        let mut builder = tabled::builder::Builder::default();
        builder.push_record(
            std::iter::once("DFA".to_string()).chain(symbols.iter().map(|sym| sym.show())),
        );

        for q in self.states() {
            let marker = if self.initial == Some(q) { "->" } else { "" };
            let name = format!("{marker}{q}");
            let mut row = vec![if self.is_accepting(q) {
                name.green().to_string()
            } else {
                name
            }];
            for sym in &symbols {
                row.push(
                    self.successor(q, *sym)
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                );
            }
            builder.push_record(row);
        }

        write!(
            f,
            "{}",
            builder
                .build()
                .with(tabled::settings::Style::rounded())
                .to_string()
        )
    }
}

/// Helper struct for the construction of deterministic acceptors. It stores a list of edges, a list
/// of state colors (acceptance) and a default color for states without explicit color.
///
/// # Example
///
/// We want to create an acceptor with two states 0 and 1 over the symbols `'a'` and `'b'`, where
/// state 0 is initial and accepting and only state 0 has a transition on `'b'`:
/// ```
/// use sba::prelude::*;
///
/// let dfa = Dfa::builder()
///     .with_state_colors([true, false])
///     .with_edges([(0, 'a', 1), (0, 'b', 0), (1, 'a', 0)])
///     .into_dfa(0);
/// assert!(dfa.accepts(&['b', 'a', 'a']));
/// assert!(!dfa.accepts(&['a', 'b']));
/// ```
pub struct DfaBuilder<S> {
    edges: Vec<(StateIndex, S, StateIndex)>,
    colors: Vec<(StateIndex, bool)>,
    default: bool,
}

impl<S> Default for DfaBuilder<S> {
    fn default() -> Self {
        Self {
            edges: vec![],
            colors: vec![],
            default: false,
        }
    }
}

impl<S: Symbol> DfaBuilder<S> {
    /// Sets the acceptance for states that have no color specified.
    pub fn default_color(mut self, accepting: bool) -> Self {
        self.default = accepting;
        self
    }

    /// Sets the acceptance of a single state.
    pub fn color(mut self, state: StateIndex, accepting: bool) -> Self {
        self.colors.push((state, accepting));
        self
    }

    /// Assigns the given colors to the states in the order in which they are given.
    pub fn with_state_colors<I: IntoIterator<Item = bool>>(self, iter: I) -> Self {
        iter.into_iter()
            .enumerate()
            .fold(self, |acc, (q, accepting)| acc.color(q, accepting))
    }

    /// Adds a list of transitions, each given as `(source, symbol, target)`.
    pub fn with_edges<I: IntoIterator<Item = (StateIndex, S, StateIndex)>>(
        mut self,
        edges: I,
    ) -> Self {
        self.edges.extend(edges);
        self
    }

    /// Builds the acceptor with the given initial state.
    pub fn into_dfa(self, initial: StateIndex) -> Dfa<S> {
        let num_states = self
            .edges
            .iter()
            .flat_map(|(p, _, q)| [*p, *q])
            .chain(self.colors.iter().map(|(q, _)| *q))
            .chain(std::iter::once(initial))
            .max()
            .map_or(0, |max| max + 1);

        let mut dfa = Dfa::new();
        for _ in 0..num_states {
            dfa.add_state(self.default);
        }
        for (q, accepting) in self.colors {
            dfa.set_accepting(q, accepting);
        }
        for (p, sym, q) in self.edges {
            if let Some(old) = dfa.add_edge(p, sym, q) {
                assert_eq!(old, q, "transition ({p}, {}) is not deterministic", sym.show());
            }
        }
        dfa.set_initial(initial);
        dfa
    }
}

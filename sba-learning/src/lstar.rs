use std::{cell::RefCell, fmt::Debug};

use itertools::Itertools;
use owo_colors::OwoColorize;
use sba::prelude::*;
use tracing::{debug, trace};

use crate::{
    oracle::{MembershipOracle, Query},
    procedural::{
        AccessSequenceTransformer, LearnerProvider, ProceduralLearner, ProceduralMembershipOracle,
    },
    provider::AtProvider,
};

const ITERATION_THRESHOLD: usize = if cfg!(debug_assertions) { 300 } else { 200000 };

type Word<S> = Vec<S>;

/// An implementation of the L* algorithm for finite acceptors. Counterexamples are processed by
/// adding all of their suffixes as experiments, which keeps the rows of the base pairwise distinct
/// so the table never becomes inconsistent.
pub struct LStar<S: Symbol, O: MembershipOracle<S>> {
    // the alphabet of what we are learning, it may grow over time
    alphabet: Vec<S>,
    // all queries that have been posed so far, together with their output
    queries: RefCell<math::Map<Word<S>, bool>>,
    // the minimal access words forming the base states
    base: Vec<Word<S>>,
    // all known experiments, the first one is always the empty word
    experiments: Vec<Word<S>>,
    // maps every row to the outputs of concatenating it with each experiment
    table: math::Map<Word<S>, Vec<bool>>,
    oracle: O,
    hypothesis: Dfa<S>,
    states: math::Bijection<Word<S>, StateIndex>,
}

impl<S: Symbol, O: MembershipOracle<S>> LStar<S, O> {
    /// Creates a new instance that learns over `alphabet` by posing queries to `oracle`. No query
    /// is posed before [`ProceduralLearner::start_learning`] is called.
    pub fn new(alphabet: Vec<S>, oracle: O) -> Self {
        Self {
            alphabet: alphabet.into_iter().unique().collect(),
            queries: RefCell::new(math::Map::default()),
            base: vec![vec![]],
            experiments: vec![vec![]],
            table: math::Map::default(),
            oracle,
            hypothesis: Dfa::new(),
            states: math::Bijection::new(),
        }
    }

    /// The oracle that queries are posed to.
    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Number of distinct words that were queried so far.
    pub fn query_count(&self) -> usize {
        self.queries.borrow().len()
    }

    fn output(&self, w: &Word<S>) -> bool {
        if let Some(known) = self.queries.borrow().get(w) {
            return *known;
        }
        let out = self.oracle.answer(w);
        self.queries.borrow_mut().insert(w.clone(), out);
        out
    }

    fn row(&self, w: &Word<S>) -> &Vec<bool> {
        self.table
            .get(w)
            .unwrap_or_else(|| panic!("no table entry for {}", w.show()))
    }

    fn one_letter_extensions(&self) -> impl Iterator<Item = Word<S>> + '_ {
        let known = math::Set::from_iter(self.base.iter());
        self.base.iter().flat_map(move |w| {
            let extensions = self
                .alphabet
                .iter()
                .map(|a| {
                    let mut x = w.clone();
                    x.push(*a);
                    x
                })
                .filter(|x| !known.contains(x))
                .collect_vec();
            std::iter::once(w.clone()).chain(extensions)
        })
    }

    fn update_table(&mut self) {
        let experiment_count = self.experiments.len();
        let mut updates = vec![];

        for mr in self.one_letter_extensions() {
            let stored = self.table.get(&mr).map(|r| r.len()).unwrap_or(0);
            assert!(
                stored <= experiment_count,
                "too many experiments present for {}",
                mr.show()
            );
            for i in stored..experiment_count {
                let concat = [mr.as_slice(), self.experiments[i].as_slice()].concat();
                let output = self.output(&concat);
                trace!("adding update that {} maps to {}", concat.show(), output.show());
                updates.push((mr.clone(), output));
            }
        }

        for (mr, output) in updates {
            self.table.entry(mr).or_default().push(output);
        }
    }

    fn rows_to_promote(&self) -> Vec<Word<S>> {
        let known = math::Set::from_iter(self.base.iter().map(|b| self.row(b)));
        let mut seen = math::Set::default();
        let mut out = vec![];

        for word in self.one_letter_extensions() {
            let row = self.row(&word);
            if !known.contains(row) && seen.insert(row) {
                out.push(word);
            }
        }
        out
    }

    fn build_hypothesis(&self) -> (Dfa<S>, math::Bijection<Word<S>, StateIndex>) {
        let mut dfa = Dfa::new();
        let mut states = math::Bijection::new();
        let mut by_row = math::Map::default();

        for mr in &self.base {
            let row = self.row(mr);
            let q = dfa.add_state(row[0]);
            states.insert(mr.clone(), q);
            by_row.insert(row, q);
        }

        for (mr, q) in self.base.iter().zip(0..) {
            for a in &self.alphabet {
                let ext = [mr.as_slice(), &[*a][..]].concat();
                let target = by_row
                    .get(self.row(&ext))
                    .unwrap_or_else(|| panic!("table is not closed for {}", ext.show()));
                dfa.add_edge(q, *a, *target);
            }
        }
        dfa.set_initial(0);
        (dfa, states)
    }

    /// Fills the table, promotes rows until it is closed and rebuilds the hypothesis.
    fn close(&mut self) {
        let threshold = std::env::var("MAX_ITERATIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(ITERATION_THRESHOLD);

        for iteration in 0..threshold {
            self.update_table();
            let todo = self.rows_to_promote();
            trace!(
                "iteration {iteration} has to promote rows {}",
                todo.iter().map(|w| w.show()).join(", ")
            );

            if todo.is_empty() {
                let (hypothesis, states) = self.build_hypothesis();
                self.hypothesis = hypothesis;
                self.states = states;
                debug!(
                    "closed table with {} states after {} iterations",
                    self.base.len(),
                    iteration + 1
                );
                return;
            }
            self.base.extend(todo);
        }

        panic!("iteration threshold of {threshold} exceeded")
    }
}

impl<S: Symbol, O: MembershipOracle<S>> AccessSequenceTransformer<S> for LStar<S, O> {
    fn transform_access_sequence(&self, word: &[S]) -> Vec<S> {
        self.hypothesis
            .reached_state(word)
            .and_then(|q| self.states.get_by_right(&q))
            .cloned()
            .unwrap_or_else(|| word.to_vec())
    }
}

impl<S: Symbol, O: MembershipOracle<S>> ProceduralLearner<S> for LStar<S, O> {
    fn start_learning(&mut self) {
        self.close();
    }

    fn refine_hypothesis(&mut self, counterexample: &Query<S>) -> bool {
        if self.hypothesis.accepts(&counterexample.input) == counterexample.output {
            return false;
        }

        let before = self.hypothesis.size();
        let input = &counterexample.input;
        for i in 0..input.len() {
            let suffix = input[i..].to_vec();
            if !self.experiments.contains(&suffix) {
                trace!("adding experiment {}", suffix.show());
                self.experiments.push(suffix);
            }
        }
        self.close();
        self.hypothesis.size() > before
    }

    fn hypothesis_model(&self) -> &Dfa<S> {
        &self.hypothesis
    }

    fn input_alphabet(&self) -> &[S] {
        &self.alphabet
    }

    fn add_alphabet_symbol(&mut self, symbol: S) {
        if self.alphabet.contains(&symbol) {
            return;
        }
        trace!("adding symbol {} to the alphabet", symbol.show());
        self.alphabet.push(symbol);
        if !self.table.is_empty() {
            self.close();
        }
    }
}

impl<S: Symbol, O: MembershipOracle<S>> Debug for LStar<S, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut builder = tabled::builder::Builder::default();
        builder.push_record(
            std::iter::once("MR".to_string()).chain(self.experiments.iter().map(|e| e.show())),
        );

        for mr in &self.base {
            let mut row = vec![mr.show().blue().to_string()];
            if let Some(outputs) = self.table.get(mr) {
                row.extend(outputs.iter().map(|o| o.show()));
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

/// Creates an [`LStar`] learner for every procedure.
#[derive(Debug, Clone, Copy, Default)]
pub struct LStarProvider;

impl<I, O, P> LearnerProvider<I, O, P> for LStarProvider
where
    I: Symbol,
    O: MembershipOracle<I>,
    P: AtProvider<I>,
{
    type Learner = LStar<SymbolWrapper<I>, ProceduralMembershipOracle<I, O, P>>;

    fn create(
        &self,
        alphabet: Vec<SymbolWrapper<I>>,
        oracle: ProceduralMembershipOracle<I, O, P>,
    ) -> Self::Learner {
        LStar::new(alphabet, oracle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::CountingOracle;

    struct Mod3;

    impl MembershipOracle<char> for Mod3 {
        fn answer(&self, word: &[char]) -> bool {
            word.iter().filter(|c| **c == 'a').count() % 3 == 0
        }
    }

    struct WithoutB;

    impl MembershipOracle<char> for WithoutB {
        fn answer(&self, word: &[char]) -> bool {
            !word.contains(&'b')
        }
    }

    fn word(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test_log::test]
    fn learn_modulo_counter() {
        let oracle = CountingOracle::new(Mod3);
        let mut lstar = LStar::new(vec!['a', 'b'], &oracle);
        lstar.start_learning();
        assert_eq!(lstar.hypothesis_model().size(), 2);
        assert!(!lstar.hypothesis_model().accepts(&word("aaa")));

        assert!(lstar.refine_hypothesis(&Query::new(word("aaa"), true)));
        let hypothesis = lstar.hypothesis_model();
        assert_eq!(hypothesis.size(), 3);
        for w in ["", "aaa", "abaa", "bbb", "aaaaaa"] {
            assert!(hypothesis.accepts(&word(w)), "{w}");
        }
        for w in ["a", "aa", "baab", "aaaa"] {
            assert!(!hypothesis.accepts(&word(w)), "{w}");
        }
        assert_eq!(lstar.transform_access_sequence(&word("bab")), word("a"));
        assert_eq!(lstar.transform_access_sequence(&word("aab")), word("aa"));

        let queries = oracle.queries();
        assert!(!lstar.refine_hypothesis(&Query::new(word("aaa"), true)));
        assert_eq!(oracle.queries(), queries);
        assert_eq!(lstar.query_count(), queries);
    }

    #[test]
    fn growing_alphabet() {
        let mut lstar = LStar::new(vec!['a'], WithoutB);
        lstar.start_learning();
        assert_eq!(lstar.hypothesis_model().size(), 1);

        lstar.add_alphabet_symbol('b');
        lstar.add_alphabet_symbol('b');
        assert_eq!(lstar.input_alphabet(), &['a', 'b']);
        let hypothesis = lstar.hypothesis_model();
        assert_eq!(hypothesis.size(), 2);
        assert!(hypothesis.accepts(&word("aa")));
        assert!(!hypothesis.accepts(&word("ba")));
        assert!(!hypothesis.accepts(&word("abb")));
        assert_eq!(lstar.transform_access_sequence(&word("aab")), word("b"));
    }
}

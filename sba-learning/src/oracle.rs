use std::{cell::Cell, rc::Rc};

use sba::prelude::*;
use tracing::trace;

/// A word together with the verdict of the system under learning. Counterexamples are queries
/// on which the current hypothesis disagrees with the system.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Query<S> {
    /// The queried word.
    pub input: Vec<S>,
    /// Whether the system accepts `input`.
    pub output: bool,
}

impl<S: Symbol> Query<S> {
    /// Creates a new query from a word and its verdict.
    pub fn new<W: Into<Vec<S>>>(input: W, output: bool) -> Self {
        Self {
            input: input.into(),
            output,
        }
    }
}

impl<S: Symbol> Show for Query<S> {
    fn show(&self) -> String {
        format!("{} {}", self.input.show(), self.output.show())
    }
}

/// Answers membership queries, i.e. whether a given word is accepted by the system under
/// learning. Answers must be consistent: asking for the same word twice must yield the same
/// verdict.
pub trait MembershipOracle<S> {
    /// Returns true if `word` is accepted.
    fn answer(&self, word: &[S]) -> bool;

    /// Answers a batch of queries at once. By default, this asks each word individually.
    fn answer_batch(&self, words: &[Vec<S>]) -> Vec<bool> {
        words.iter().map(|word| self.answer(word)).collect()
    }
}

impl<S, O: MembershipOracle<S> + ?Sized> MembershipOracle<S> for &O {
    fn answer(&self, word: &[S]) -> bool {
        O::answer(self, word)
    }
}

impl<S, O: MembershipOracle<S> + ?Sized> MembershipOracle<S> for Rc<O> {
    fn answer(&self, word: &[S]) -> bool {
        O::answer(self, word)
    }
}

/// Answers membership queries by simulating a known system.
#[derive(Debug, Clone)]
pub struct SimulatorOracle<A> {
    system: A,
}

impl<A: Sba> SimulatorOracle<A> {
    /// Creates an oracle that answers according to `system`.
    pub fn new(system: A) -> Self {
        Self { system }
    }
}

impl<A: Sba> MembershipOracle<A::Symbol> for SimulatorOracle<A> {
    fn answer(&self, word: &[A::Symbol]) -> bool {
        let out = self.system.accepts(word);
        trace!("membership query {} answered with {}", word.show(), out.show());
        out
    }
}

/// Wraps another oracle and counts the queries and symbols that are passed through it.
#[derive(Debug)]
pub struct CountingOracle<O> {
    inner: O,
    queries: Cell<usize>,
    symbols: Cell<usize>,
}

impl<O> CountingOracle<O> {
    /// Starts counting the queries posed to `inner`.
    pub fn new(inner: O) -> Self {
        Self {
            inner,
            queries: Cell::new(0),
            symbols: Cell::new(0),
        }
    }

    /// Number of queries posed so far.
    pub fn queries(&self) -> usize {
        self.queries.get()
    }

    /// Total length of all queries posed so far.
    pub fn symbols(&self) -> usize {
        self.symbols.get()
    }
}

impl<S, O: MembershipOracle<S>> MembershipOracle<S> for CountingOracle<O> {
    fn answer(&self, word: &[S]) -> bool {
        self.queries.set(self.queries.get() + 1);
        self.symbols.set(self.symbols.get() + word.len());
        self.inner.answer(word)
    }
}

/// Decides whether a hypothesis is correct, and if not, produces a counterexample.
pub trait EquivalenceOracle<I: Symbol> {
    /// Returns a word on which `hypothesis` and the system under learning disagree, together
    /// with the verdict of the system, or `None` if no such word could be found.
    fn find_counterexample<H: Sba<Symbol = I>>(
        &self,
        hypothesis: &H,
        alphabet: &SbaAlphabet<I>,
    ) -> Option<Query<I>>;
}

/// Answers equivalence queries exactly by comparing the hypothesis with a known system.
/// Counterexamples are as short as the exploration in [`find_separating_word`] finds them, and
/// each of their proper prefixes is accepted by the system.
#[derive(Debug, Clone)]
pub struct SimulatorEqOracle<A> {
    system: A,
}

impl<A: Sba> SimulatorEqOracle<A> {
    /// Creates an oracle that compares hypotheses with `system`.
    pub fn new(system: A) -> Self {
        Self { system }
    }
}

impl<I: Symbol, A: Sba<Symbol = I>> EquivalenceOracle<I> for SimulatorEqOracle<A> {
    fn find_counterexample<H: Sba<Symbol = I>>(
        &self,
        hypothesis: &H,
        alphabet: &SbaAlphabet<I>,
    ) -> Option<Query<I>> {
        debug_assert!(alphabet == self.system.alphabet());
        let input = find_separating_word(&self.system, hypothesis)?;
        let output = self.system.accepts(&input);
        Some(Query::new(input, output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counting_queries() {
        let alphabet = SbaAlphabet::new(['a'], ['S'], 'R').unwrap();
        let procedure = Dfa::builder()
            .default_color(true)
            .with_edges([(0, 'a', 0), (0, 'R', 1)])
            .into_dfa(0);
        let system = StackSba::new(alphabet, Some('S'), [('S', procedure)]);

        let oracle = CountingOracle::new(SimulatorOracle::new(&system));
        assert!(oracle.answer(&['S', 'a', 'R']));
        assert_eq!(
            (&oracle).answer_batch(&[vec!['S', 'R', 'a'], vec![]]),
            vec![false, true]
        );
        assert_eq!(oracle.queries(), 3);
        assert_eq!(oracle.symbols(), 6);
    }

    #[test]
    fn simulator_counterexamples() {
        let alphabet = SbaAlphabet::new(['a'], ['S'], 'R').unwrap();
        let target = StackSba::new(
            alphabet.clone(),
            Some('S'),
            [(
                'S',
                Dfa::builder()
                    .default_color(true)
                    .with_edges([(0, 'a', 0), (0, 'R', 1)])
                    .into_dfa(0),
            )],
        );
        let eq = SimulatorEqOracle::new(&target);
        assert_eq!(eq.find_counterexample(&target, &alphabet), None);

        let empty = MappedStackSba::empty(alphabet.clone(), AlphabetMapper::new(&alphabet));
        assert_eq!(
            eq.find_counterexample(&empty, &alphabet),
            Some(Query::new(['S'], true))
        );
    }
}

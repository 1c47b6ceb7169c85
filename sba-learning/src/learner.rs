use std::{cell::RefCell, rc::Rc};

use itertools::Itertools;
use sba::prelude::*;
use tracing::{debug, info, trace, warn};

use crate::{
    oracle::{MembershipOracle, Query},
    procedural::{
        AccessSequenceTransformer, LearnerProvider, ProceduralLearner, ProceduralMembershipOracle,
    },
    provider::{AtProvider, OptimizingAtProvider},
};

/// A change to the set of procedures or to the local alphabets. Every event is applied to the
/// alphabet mapper and to all live procedural learners at once, and then appended to the log
/// that is exposed by [`SbaLearner::events`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LearningEvent<I: Symbol> {
    /// A learner was created for the procedure of the given call symbol.
    ProcedureDiscovered(I),
    /// The given wrapper was added to every local alphabet and is now the wrapper of its symbol.
    AlphabetGrown(SymbolWrapper<I>),
}

/// Learns a system of behavioral automata by decomposing it into one [`ProceduralLearner`] per
/// procedure.
///
/// Nothing is learned before the first positive counterexample, since only that reveals the
/// initial procedure. Positive counterexamples are scanned for access sequences and terminating
/// sequences, which discover new procedures and make calls usable. Afterwards, every
/// counterexample is reduced to the first position at which the hypothesis goes wrong, and the
/// local word of the procedure that is active there is passed to its learner, until the
/// hypothesis agrees with the counterexample.
///
/// The procedural learners pose their queries through a [`ProceduralMembershipOracle`], which
/// embeds them into global words using the sequences recorded by the [`AtProvider`] `P`.
pub struct SbaLearner<I, O, P, F>
where
    I: Symbol,
    O: MembershipOracle<I>,
    P: AtProvider<I>,
    F: LearnerProvider<I, O, P>,
{
    alphabet: SbaAlphabet<I>,
    oracle: Rc<O>,
    factory: F,
    provider: Rc<RefCell<P>>,
    learners: math::OrderedMap<I, F::Learner>,
    initial_call: Option<I>,
    mapper: AlphabetMapper<I>,
    events: Vec<LearningEvent<I>>,
}

impl<I, O, F> SbaLearner<I, O, OptimizingAtProvider<I>, F>
where
    I: Symbol,
    O: MembershipOracle<I>,
    F: LearnerProvider<I, O, OptimizingAtProvider<I>>,
{
    /// Creates a learner that manages its sequences with an [`OptimizingAtProvider`] and
    /// creates procedural learners with `factory`.
    pub fn new(alphabet: SbaAlphabet<I>, oracle: O, factory: F) -> Self {
        let provider = OptimizingAtProvider::new(alphabet.clone());
        Self::with_at_provider(alphabet, oracle, factory, provider)
    }
}

impl<I, O, P, F> SbaLearner<I, O, P, F>
where
    I: Symbol,
    O: MembershipOracle<I>,
    P: AtProvider<I>,
    F: LearnerProvider<I, O, P>,
{
    /// Creates a learner that manages its sequences with the given `provider`.
    pub fn with_at_provider(alphabet: SbaAlphabet<I>, oracle: O, factory: F, provider: P) -> Self {
        Self {
            mapper: AlphabetMapper::new(&alphabet),
            alphabet,
            oracle: Rc::new(oracle),
            factory,
            provider: Rc::new(RefCell::new(provider)),
            learners: math::OrderedMap::default(),
            initial_call: None,
            events: vec![],
        }
    }

    /// Starts the learning process. No query is posed, the initial procedure is only known once
    /// a positive counterexample has been seen.
    pub fn start_learning(&mut self) {
        trace!("waiting for the first positive counterexample");
    }

    /// Refines the hypothesis with `counterexample`. Returns true if anything changed, that is if
    /// new procedures or sequences were found, a procedural learner was refined or return closure
    /// had to be repaired.
    ///
    /// # Panics
    /// If the counterexample can not be attributed to a procedure or the responsible learner does
    /// not change its hypothesis. Both only happen if the oracles answer inconsistently.
    pub fn refine_hypothesis(&mut self, counterexample: &Query<I>) -> bool {
        if counterexample.input.is_empty() {
            warn!("ignoring empty counterexample {}", counterexample.show());
            return false;
        }

        let mut changed = self.extract_sequences(counterexample);
        while self.refine_internal(counterexample) {
            changed = true;
        }
        if self.ensure_return_closure() {
            changed = true;
        }

        debug!(
            "refinement with {} done, hypothesis has size {}",
            counterexample.show(),
            self.learners
                .values()
                .map(|l| l.hypothesis_model().size())
                .sum::<usize>()
        );
        changed
    }

    /// Assembles the current hypothesis from the hypotheses of all procedural learners. Before
    /// any procedure is discovered, this accepts only the empty word.
    pub fn hypothesis_model(&self) -> MappedStackSba<I> {
        if self.learners.is_empty() {
            return MappedStackSba::empty(self.alphabet.clone(), self.mapper.clone());
        }
        MappedStackSba::new(
            self.alphabet.clone(),
            self.initial_call,
            self.learners
                .iter()
                .map(|(call, learner)| (*call, learner.hypothesis_model().clone())),
            self.mapper.clone(),
        )
    }

    /// The alphabet of the system under learning.
    pub fn alphabet(&self) -> &SbaAlphabet<I> {
        &self.alphabet
    }

    /// The current mapping from raw symbols to wrappers.
    pub fn mapper(&self) -> &AlphabetMapper<I> {
        &self.mapper
    }

    /// The initial procedure, if a positive counterexample has been seen.
    pub fn initial_procedure(&self) -> Option<I> {
        self.initial_call
    }

    /// The call symbols of all discovered procedures, in order of discovery.
    pub fn discovered_procedures(&self) -> Vec<I> {
        self.learners.keys().copied().collect()
    }

    /// The learner of the procedure of `call`, if it has been discovered.
    pub fn learner(&self, call: I) -> Option<&F::Learner> {
        self.learners.get(&call)
    }

    /// Returns true if a terminating sequence of `call` is known.
    pub fn has_terminating_sequence(&self, call: I) -> bool {
        self.provider.borrow().has_terminating_sequence(call)
    }

    /// All events that occurred so far, in the order in which they were applied.
    pub fn events(&self) -> &[LearningEvent<I>] {
        &self.events
    }

    /// Returns true if no procedural hypothesis accepts a word that continues after a return.
    pub fn is_return_closed(&self) -> bool {
        self.learners
            .keys()
            .all(|call| self.find_return_closure_violation(*call).is_none())
    }

    /// Searches the hypothesis of `call` for a state that is reached by reading the return symbol
    /// and from which some symbol leads to an accepting state. Only states that are reached from
    /// the representatives of the learner are considered. The violation is returned as a negative
    /// local counterexample.
    pub fn find_return_closure_violation(&self, call: I) -> Option<Query<SymbolWrapper<I>>> {
        let learner = self.learners.get(&call)?;
        let hypothesis = learner.hypothesis_model();
        let inputs = learner.input_alphabet();

        let cover = hypothesis
            .state_cover(inputs)
            .into_iter()
            .map(|access| learner.transform_access_sequence(&access))
            .unique()
            .collect_vec();

        for access in cover {
            let Some(q) = hypothesis.reached_state(&access) else {
                continue;
            };
            for ret in inputs.iter().filter(|sym| sym.is_return()) {
                let Some(succ) = hypothesis.successor(q, *ret) else {
                    continue;
                };
                for next in inputs {
                    if hypothesis
                        .successor(succ, *next)
                        .is_some_and(|p| hypothesis.is_accepting(p))
                    {
                        let input = [access.as_slice(), &[*ret, *next][..]].concat();
                        return Some(Query::new(input, false));
                    }
                }
            }
        }
        None
    }

    fn apply(&mut self, event: LearningEvent<I>) {
        trace!("applying {event:?}");
        match event {
            LearningEvent::ProcedureDiscovered(call) => {
                let oracle = ProceduralMembershipOracle::new(
                    &self.alphabet,
                    Rc::clone(&self.oracle),
                    call,
                    Rc::clone(&self.provider),
                );
                let mut learner = self.factory.create(self.mapper.values(), oracle);
                learner.start_learning();
                self.learners.insert(call, learner);
            }
            LearningEvent::AlphabetGrown(wrapper) => {
                self.mapper.set(wrapper);
                for learner in self.learners.values_mut() {
                    learner.add_alphabet_symbol(wrapper);
                }
            }
        }
        self.events.push(event);
    }

    /// Makes `call` usable in every local alphabet, returns false if it already was.
    fn make_usable(&mut self, call: I) -> bool {
        match self.mapper.get(call) {
            Some(current) if !current.is_usable() => {
                self.apply(LearningEvent::AlphabetGrown(SymbolWrapper::call(call, true)));
                true
            }
            _ => false,
        }
    }

    fn extract_sequences(&mut self, counterexample: &Query<I>) -> bool {
        if !counterexample.output {
            return false;
        }
        let input = &counterexample.input;

        // positive counterexamples are always rooted in the initial procedure
        self.initial_call = Some(input[0]);

        let found = self.provider.borrow_mut().scan_positive_counterexample(input);
        let mut changed = false;

        for call in found.new_terminations {
            changed |= self.make_usable(call);
        }

        for call in found.new_calls {
            info!("discovered procedure {}", call.show());
            self.apply(LearningEvent::ProcedureDiscovered(call));
            changed = true;

            let improved = {
                let learner = &self.learners[&call];
                self.provider.borrow_mut().scan_refined_procedures(
                    &[(call, learner.hypothesis_model())],
                    &self.learners,
                    learner.input_alphabet(),
                )
            };
            for call in improved {
                self.make_usable(call);
            }
        }

        changed
    }

    fn refine_internal(&mut self, counterexample: &Query<I>) -> bool {
        let hypothesis = self.hypothesis_model();
        let input = &counterexample.input;
        if hypothesis.accepts(input) == counterexample.output {
            return false;
        }

        let mismatch = mismatch_index(&hypothesis, input, counterexample.output);
        let call_idx = self
            .alphabet
            .find_call_index(input, mismatch)
            .unwrap_or_else(|| {
                panic!(
                    "no procedure is active at position {mismatch} of {}",
                    input.show()
                )
            });
        let procedure = input[call_idx];

        let local = [
            self.alphabet
                .normalize(&input[call_idx + 1..mismatch])
                .as_slice(),
            &[input[mismatch]][..],
        ]
        .concat();
        let local = self
            .mapper
            .map_word(&local)
            .unwrap_or_else(|| panic!("{} contains unknown symbols", input.show()));
        let local = Query::new(local, counterexample.output);
        trace!(
            "local counterexample {} for procedure {}",
            local.show(),
            procedure.show()
        );

        let learner = self
            .learners
            .get_mut(&procedure)
            .unwrap_or_else(|| panic!("procedure {} is not known", procedure.show()));
        assert!(
            learner.refine_hypothesis(&local),
            "learner of {} did not use the counterexample {}",
            procedure.show(),
            local.show()
        );
        true
    }

    fn ensure_return_closure(&mut self) -> bool {
        let mut changed = false;
        for call in self.discovered_procedures() {
            while let Some(violation) = self.find_return_closure_violation(call) {
                trace!(
                    "return closure of {} is violated by {}",
                    call.show(),
                    violation.show()
                );
                let learner = self
                    .learners
                    .get_mut(&call)
                    .unwrap_or_else(|| panic!("procedure {} is not known", call.show()));
                assert!(
                    learner.refine_hypothesis(&violation),
                    "learner of {} did not repair return closure",
                    call.show()
                );
                changed = true;
            }
        }
        changed
    }
}

/// The position at which `hypothesis` goes wrong on `input`. For positive counterexamples, this is
/// the first position after which the hypothesis rejects, for negative ones it is the last
/// position.
fn mismatch_index<A: Sba>(hypothesis: &A, input: &[A::Symbol], output: bool) -> usize {
    if output {
        let mut state = hypothesis.initial_state();
        for (i, sym) in input.iter().enumerate() {
            state = hypothesis.transition(&state, *sym);
            if !hypothesis.is_accepting(&state) {
                return i;
            }
        }
    }
    input.len() - 1
}

#[cfg(test)]
mod tests {
    use fastrand::Rng;
    use sba::random::{keylock_sba, random_partial_sba, random_sba};

    use super::*;
    use crate::{
        lstar::{LStar, LStarProvider},
        oracle::{CountingOracle, EquivalenceOracle, SimulatorEqOracle, SimulatorOracle},
        provider::DefaultAtProvider,
    };

    fn word(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    fn alphabet() -> SbaAlphabet<char> {
        SbaAlphabet::new(['a', 'b', 'c'], ['S', 'T'], 'R').unwrap()
    }

    fn palindromes() -> StackSba<char> {
        let s = Dfa::builder()
            .default_color(true)
            .with_edges([
                (0, 'T', 5),
                (0, 'a', 1),
                (0, 'b', 2),
                (0, 'R', 6),
                (1, 'S', 3),
                (1, 'R', 6),
                (2, 'S', 4),
                (2, 'R', 6),
                (3, 'a', 5),
                (4, 'b', 5),
                (5, 'R', 6),
            ])
            .into_dfa(0);
        let t = Dfa::builder()
            .default_color(true)
            .with_edges([
                (0, 'S', 3),
                (0, 'c', 1),
                (1, 'T', 2),
                (1, 'R', 4),
                (2, 'c', 3),
                (3, 'R', 4),
            ])
            .into_dfa(0);
        StackSba::new(alphabet(), Some('S'), [('S', s), ('T', t)])
    }

    /// Runs the learning loop against an exact equivalence oracle for `target`.
    fn learn<I, O, P, F>(
        learner: &mut SbaLearner<I, O, P, F>,
        target: &StackSba<I>,
    ) -> MappedStackSba<I>
    where
        I: Symbol,
        O: MembershipOracle<I>,
        P: AtProvider<I>,
        F: LearnerProvider<I, O, P>,
    {
        let eq = SimulatorEqOracle::new(target);
        learner.start_learning();
        let mut hypothesis = learner.hypothesis_model();
        let mut rounds = 0;

        while let Some(counterexample) = eq.find_counterexample(&hypothesis, target.alphabet()) {
            let known = learner.discovered_procedures();
            let terminating = target
                .alphabet()
                .calls()
                .iter()
                .filter(|call| learner.has_terminating_sequence(**call))
                .copied()
                .collect_vec();
            let mut refined = false;
            while learner.refine_hypothesis(&counterexample) {
                refined = true;
            }
            assert!(refined, "{} was not used", counterexample.show());
            assert!(learner.is_return_closed());

            let discovered = learner.discovered_procedures();
            assert_eq!(&discovered[..known.len()], known.as_slice());
            for call in &terminating {
                assert!(
                    learner.has_terminating_sequence(*call),
                    "lost the terminating sequence of {}",
                    call.show()
                );
            }

            hypothesis = learner.hypothesis_model();
            assert_eq!(
                hypothesis.accepts(&counterexample.input),
                counterexample.output
            );
            rounds += 1;
            assert!(rounds < 500, "learning does not terminate");
        }
        hypothesis
    }

    #[test_log::test]
    fn learn_palindromes() {
        let target = palindromes();
        let oracle = CountingOracle::new(SimulatorOracle::new(&target));
        let mut learner = SbaLearner::new(alphabet(), &oracle, LStarProvider);
        assert!(learner.hypothesis_model().accepts(&[]));
        assert!(!learner.hypothesis_model().accepts(&word("S")));

        let hypothesis = learn(&mut learner, &target);
        assert!(equivalent(&hypothesis, &target));

        let mut complete = target.clone();
        for call in ['S', 'T'] {
            if let Some(procedure) = complete.procedure_mut(call) {
                procedure.complete(alphabet().universe());
            }
        }
        assert_eq!(complete.size(), 14);
        assert_eq!(hypothesis.size(), complete.size());
        assert_eq!(learner.initial_procedure(), Some('S'));
        assert!(learner.has_terminating_sequence('S'));
        assert!(learner.has_terminating_sequence('T'));

        let positive = word("SaSTcRRaR");
        for i in 0..=positive.len() {
            assert!(hypothesis.accepts(&positive[..i]));
        }
        for negative in ["T", "abc", "Sc", "SaRS", "SaRa", "SaaRa", "SaRR", "SaSRR"] {
            assert!(!hypothesis.accepts(&word(negative)), "{negative}");
        }
        debug!(
            "learned palindromes with {} queries and {} symbols",
            oracle.queries(),
            oracle.symbols()
        );
    }

    #[test]
    fn events_are_logged_in_order() {
        let target = palindromes();
        let mut learner = SbaLearner::with_at_provider(
            alphabet(),
            SimulatorOracle::new(&target),
            LStarProvider,
            DefaultAtProvider::new(alphabet()),
        );

        assert!(!learner.refine_hypothesis(&Query::new(vec![], true)));
        assert!(learner.events().is_empty());
        assert_eq!(
            format!("{:?}", LearningEvent::ProcedureDiscovered('S')),
            "ProcedureDiscovered('S')"
        );

        assert!(learner.refine_hypothesis(&Query::new(word("STcRR"), true)));
        assert_eq!(learner.discovered_procedures(), vec!['S', 'T']);
        // terminations are applied before any learner exists
        assert_eq!(
            learner.events(),
            &[
                LearningEvent::AlphabetGrown(SymbolWrapper::call('S', true)),
                LearningEvent::AlphabetGrown(SymbolWrapper::call('T', true)),
                LearningEvent::ProcedureDiscovered('S'),
                LearningEvent::ProcedureDiscovered('T')
            ]
        );
        assert_eq!(learner.mapper().get('S'), Some(SymbolWrapper::call('S', true)));
        assert_eq!(learner.mapper().get('T'), Some(SymbolWrapper::call('T', true)));

        let alphabet = learner.learner('T').unwrap().input_alphabet().to_vec();
        assert!(alphabet.contains(&SymbolWrapper::call('T', true)));
        assert!(!alphabet.contains(&SymbolWrapper::call('T', false)));
        assert!(learner.hypothesis_model().accepts(&word("STcRR")));
        assert!(learner.is_return_closed());
    }

    #[test]
    fn calls_become_usable_later() {
        let target = palindromes();
        let mut learner = SbaLearner::new(alphabet(), SimulatorOracle::new(&target), LStarProvider);

        assert!(learner.refine_hypothesis(&Query::new(word("ST"), true)));
        assert_eq!(learner.discovered_procedures(), vec!['S', 'T']);
        // S may return right away, which its first hypothesis already reveals
        assert!(learner.has_terminating_sequence('S'));
        assert!(!learner.has_terminating_sequence('T'));
        assert_eq!(
            learner.events(),
            &[
                LearningEvent::ProcedureDiscovered('S'),
                LearningEvent::AlphabetGrown(SymbolWrapper::call('S', true)),
                LearningEvent::ProcedureDiscovered('T')
            ]
        );

        assert!(learner.refine_hypothesis(&Query::new(word("STcR"), true)));
        assert!(learner.has_terminating_sequence('T'));
        let grown = SymbolWrapper::call('T', true);
        assert!(learner.events().contains(&LearningEvent::AlphabetGrown(grown)));
        for call in ['S', 'T'] {
            let inputs = learner.learner(call).unwrap().input_alphabet();
            assert!(inputs.contains(&grown));
            assert!(inputs.contains(&SymbolWrapper::call('T', false)));
        }
        assert!(learner.hypothesis_model().accepts(&word("STcR")));
        assert!(!learner.refine_hypothesis(&Query::new(word("STcR"), true)));
    }

    #[test]
    fn composed_size() {
        let target = palindromes();
        let mut learner = SbaLearner::new(alphabet(), SimulatorOracle::new(&target), LStarProvider);
        let hypothesis = learn(&mut learner, &target);
        let sum: usize = learner
            .discovered_procedures()
            .into_iter()
            .map(|call| learner.learner(call).unwrap().hypothesis_model().size())
            .sum();
        assert_eq!(hypothesis.size(), sum);
        assert!(learner.is_return_closed());
    }

    type OwnedOracle = SimulatorOracle<StackSba<char>>;

    #[test]
    fn learners_from_closures() {
        let target = palindromes();
        let factory = |alphabet: Vec<SymbolWrapper<char>>,
                       oracle: ProceduralMembershipOracle<char, OwnedOracle, DefaultAtProvider<char>>| {
            LStar::new(alphabet, oracle)
        };
        let mut learner = SbaLearner::with_at_provider(
            alphabet(),
            SimulatorOracle::new(target.clone()),
            factory,
            DefaultAtProvider::new(alphabet()),
        );
        let hypothesis = learn(&mut learner, &target);
        assert!(equivalent(&hypothesis, &target));
    }

    fn integer_alphabet() -> SbaAlphabet<u32> {
        SbaAlphabet::new(10..26, 0..10, 26).unwrap()
    }

    fn check_conformance(target: &StackSba<u32>, seed: u64) {
        let alphabet = integer_alphabet();
        let universe = alphabet.universe().collect_vec();

        let mut optimizing =
            SbaLearner::new(alphabet.clone(), SimulatorOracle::new(target), LStarProvider);
        let mut default = SbaLearner::with_at_provider(
            alphabet.clone(),
            SimulatorOracle::new(target),
            LStarProvider,
            DefaultAtProvider::new(alphabet.clone()),
        );

        for hypothesis in [learn(&mut optimizing, target), learn(&mut default, target)] {
            assert!(equivalent(&hypothesis, target), "seed {seed}");
            assert_eq!(hypothesis.size(), target.size(), "seed {seed}");

            let mut rng = Rng::with_seed(seed);
            for _ in 0..200 {
                let mut w = target.initial_procedure().into_iter().collect_vec();
                for _ in 0..rng.usize(..12) {
                    w.push(universe[rng.usize(..universe.len())]);
                }
                assert_eq!(hypothesis.accepts(&w), target.accepts(&w), "{}", w.show());
            }
        }
    }

    #[test_log::test]
    fn random_conformance() {
        let alphabet = integer_alphabet();
        for seed in 0..4 {
            let mut rng = Rng::with_seed(seed);
            check_conformance(&random_partial_sba(&alphabet, 10, &mut rng), seed);
            check_conformance(&random_sba(&alphabet, 10, &mut rng), seed);
            check_conformance(&keylock_sba(&alphabet, 10, &mut rng), seed);
        }
    }
}

use std::{cell::RefCell, rc::Rc};

use sba::prelude::*;
use tracing::trace;

use crate::{
    oracle::{MembershipOracle, Query},
    provider::AtProvider,
};

/// Maps arbitrary access words onto the representative access word that a learner uses for the
/// state they reach. Implementations must not pose membership queries.
pub trait AccessSequenceTransformer<S> {
    /// Returns the representative of the state that is reached by `word`.
    fn transform_access_sequence(&self, word: &[S]) -> Vec<S>;
}

/// A learner for a single procedure. It learns a finite acceptor from membership queries and
/// refines it with counterexamples, and its alphabet may grow during learning.
pub trait ProceduralLearner<S: Symbol>: AccessSequenceTransformer<S> {
    /// Computes the first hypothesis.
    fn start_learning(&mut self);

    /// Refines the hypothesis with the given counterexample. Returns true if the hypothesis
    /// changed, which must happen whenever the hypothesis disagrees with `counterexample`.
    fn refine_hypothesis(&mut self, counterexample: &Query<S>) -> bool;

    /// The current hypothesis, which is complete over [`Self::input_alphabet`].
    fn hypothesis_model(&self) -> &Dfa<S>;

    /// The current alphabet of the learner.
    fn input_alphabet(&self) -> &[S];

    /// Adds a symbol to the alphabet without discarding what has been learned. Adding a known
    /// symbol has no effect.
    fn add_alphabet_symbol(&mut self, symbol: S);
}

/// Creates a [`ProceduralLearner`] for a newly discovered procedure, given its initial alphabet
/// and a membership oracle that answers local queries for it. Any closure with the matching
/// signature is a provider as well.
pub trait LearnerProvider<I: Symbol, O, P> {
    /// The type of learner that is created.
    type Learner: ProceduralLearner<SymbolWrapper<I>>;

    /// Creates a learner over `alphabet` which poses its queries to `oracle`.
    fn create(
        &self,
        alphabet: Vec<SymbolWrapper<I>>,
        oracle: ProceduralMembershipOracle<I, O, P>,
    ) -> Self::Learner;
}

impl<I, O, P, L, F> LearnerProvider<I, O, P> for F
where
    I: Symbol,
    L: ProceduralLearner<SymbolWrapper<I>>,
    F: Fn(Vec<SymbolWrapper<I>>, ProceduralMembershipOracle<I, O, P>) -> L,
{
    type Learner = L;

    fn create(
        &self,
        alphabet: Vec<SymbolWrapper<I>>,
        oracle: ProceduralMembershipOracle<I, O, P>,
    ) -> L {
        (self)(alphabet, oracle)
    }
}

/// Answers membership queries of a single procedure by embedding local words into a global
/// context. A local word `w` of procedure `c` is translated into the access sequence of `c`,
/// followed by `c` itself and the expansion of `w`. In the expansion, every usable call `d` is
/// replaced by `d`, the terminating sequence of `d` and the return symbol.
///
/// Calls that are not usable and the return symbol are only allowed as the last symbol of a local
/// word, since nothing can follow them locally. Words that violate this are rejected without
/// consulting the global oracle.
pub struct ProceduralMembershipOracle<I: Symbol, O, P> {
    return_symbol: I,
    oracle: Rc<O>,
    procedure: I,
    provider: Rc<RefCell<P>>,
}

impl<I: Symbol, O, P> ProceduralMembershipOracle<I, O, P> {
    /// Creates the local oracle for `procedure`, looking up access and terminating sequences
    /// from `provider` whenever a query is answered.
    pub fn new(
        alphabet: &SbaAlphabet<I>,
        oracle: Rc<O>,
        procedure: I,
        provider: Rc<RefCell<P>>,
    ) -> Self {
        Self {
            return_symbol: alphabet.return_symbol(),
            oracle,
            procedure,
            provider,
        }
    }

    /// The call symbol of the procedure this oracle answers for.
    pub fn procedure(&self) -> I {
        self.procedure
    }
}

impl<I: Symbol, O: MembershipOracle<I>, P: AtProvider<I>> ProceduralMembershipOracle<I, O, P> {
    /// Translates a local word into the global word that is posed to the oracle, or returns `None`
    /// if the word can not occur locally.
    pub fn embed(&self, word: &[SymbolWrapper<I>]) -> Option<Vec<I>> {
        let provider = self.provider.borrow();
        let mut out = provider.access_sequence(self.procedure).to_vec();
        out.push(self.procedure);

        for (i, sym) in word.iter().enumerate() {
            let last = i + 1 == word.len();
            match sym.kind() {
                SymbolType::Internal => out.push(sym.symbol()),
                SymbolType::Call if sym.is_usable() => {
                    out.push(sym.symbol());
                    out.extend_from_slice(provider.terminating_sequence(sym.symbol()));
                    out.push(self.return_symbol);
                }
                SymbolType::Call | SymbolType::Return => {
                    if !last {
                        return None;
                    }
                    out.push(sym.symbol());
                }
            }
        }
        Some(out)
    }
}

impl<I: Symbol, O: MembershipOracle<I>, P: AtProvider<I>> MembershipOracle<SymbolWrapper<I>>
    for ProceduralMembershipOracle<I, O, P>
{
    fn answer(&self, word: &[SymbolWrapper<I>]) -> bool {
        let Some(global) = self.embed(word) else {
            trace!(
                "local query {} of {} is malformed",
                word.show(),
                self.procedure.show()
            );
            return false;
        };
        self.oracle.answer(global.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::DefaultAtProvider;

    struct Recorder(RefCell<Vec<Vec<char>>>);

    impl MembershipOracle<char> for Recorder {
        fn answer(&self, word: &[char]) -> bool {
            self.0.borrow_mut().push(word.to_vec());
            true
        }
    }

    #[test]
    fn embedding_local_words() {
        let alphabet = SbaAlphabet::new(['a', 'b'], ['S', 'T'], 'R').unwrap();
        let mut provider = DefaultAtProvider::new(alphabet.clone());
        provider.scan_positive_counterexample(&"SaTbRaS".chars().collect::<Vec<_>>());
        let provider = Rc::new(RefCell::new(provider));
        let recorder = Rc::new(Recorder(RefCell::new(vec![])));

        let oracle = ProceduralMembershipOracle::new(&alphabet, Rc::clone(&recorder), 'T', provider);
        let mut mapper = AlphabetMapper::new(&alphabet);
        let unusable_s = mapper.get('S').unwrap();
        mapper.upgrade('T');
        let local = |w: &str| mapper.map_word(&w.chars().collect::<Vec<_>>()).unwrap();

        assert!(oracle.answer(&local("aTa")));
        assert!(oracle.answer(&local("aS")));
        assert!(oracle.answer(&local("R")));
        assert!(!oracle.answer(&local("Ra")));
        assert!(!oracle.answer(&[unusable_s, SymbolWrapper::internal('a')]));

        let posed: Vec<String> = recorder
            .0
            .borrow()
            .iter()
            .map(|w| w.iter().collect())
            .collect();
        assert_eq!(posed, vec!["SaTaTbRa", "SaTaS", "SaTR"]);
    }
}

use std::{fmt::Debug, rc::Rc};

use tracing::trace;

use crate::{
    alphabet::{SbaAlphabet, SymbolType},
    dfa::{Acceptor, Dfa, StateIndex},
    math::OrderedMap,
    wrapper::{AlphabetMapper, SymbolWrapper},
    Show, Symbol,
};

/// One activation record on the stack of an SBA run. It stores which procedure is active (given
/// by its call symbol), the current local state of that procedure and the frame of the caller,
/// which is resumed once the procedure returns.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Frame<I> {
    procedure: I,
    state: StateIndex,
    below: Option<Rc<Frame<I>>>,
}

impl<I: Symbol> Frame<I> {
    /// The call symbol of the procedure this frame belongs to.
    pub fn procedure(&self) -> I {
        self.procedure
    }

    /// The local state of the procedure.
    pub fn state(&self) -> StateIndex {
        self.state
    }

    /// The frame of the caller, if any.
    pub fn below(&self) -> Option<&Frame<I>> {
        self.below.as_deref()
    }

    /// Number of frames on the stack, including this one.
    pub fn depth(&self) -> usize {
        1 + self.below().map_or(0, Frame::depth)
    }

    fn with_state(&self, state: StateIndex) -> Self {
        Self {
            procedure: self.procedure,
            state,
            below: self.below.clone(),
        }
    }
}

impl<I: Symbol> Debug for Frame<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.procedure.show(), self.state)?;
        if let Some(below) = self.below() {
            write!(f, " | {below:?}")?;
        }
        Ok(())
    }
}

/// A configuration of an SBA. Besides the regular configurations, which are non-empty stacks of
/// [`Frame`]s, there are three distinguished ones: [`SbaState::Init`] before anything was read,
/// [`SbaState::Term`] after the initial procedure has returned and [`SbaState::Sink`] which
/// is entered whenever something illegal happens and which never accepts.
///
/// Stacks share their tails through reference counting, so cloning a state is cheap and
/// advancing a state never affects other states.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum SbaState<I> {
    /// Nothing has been read yet.
    Init,
    /// The initial procedure has terminated.
    Term,
    /// The run has died.
    Sink,
    /// Some procedure is active, the frame is the top of the stack.
    Active(Rc<Frame<I>>),
}

impl<I: Symbol> SbaState<I> {
    /// Returns the number of frames on the stack, which is zero for all distinguished states.
    pub fn stack_depth(&self) -> usize {
        match self {
            SbaState::Active(frame) => frame.depth(),
            _ => 0,
        }
    }

    /// Returns the top frame if the state is not one of the distinguished states.
    pub fn top(&self) -> Option<&Frame<I>> {
        match self {
            SbaState::Active(frame) => Some(frame),
            _ => None,
        }
    }

    /// Returns true if the state is the sink.
    pub fn is_sink(&self) -> bool {
        matches!(self, SbaState::Sink)
    }
}

impl<I: Symbol> Debug for SbaState<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SbaState::Init => write!(f, "INIT"),
            SbaState::Term => write!(f, "TERM"),
            SbaState::Sink => write!(f, "SINK"),
            SbaState::Active(frame) => write!(f, "[{frame:?}]"),
        }
    }
}

/// A system of behavioral automata. Implementors only need to provide the alphabet, the initial
/// procedure and a lookup from call symbols to procedures. The stack semantics, i.e. how symbols
/// move between configurations and which configurations accept, are provided by this trait.
///
/// Local transitions must lead to accepting local states. Hence every configuration besides the
/// sink accepts, except right after a call into a procedure whose initial state rejects. If all
/// initial states accept, the accepted language is prefix-closed.
///
/// # Example
/// ```
/// use sba::prelude::*;
///
/// let alphabet = SbaAlphabet::new(['a'], ['S'], 'R').unwrap();
/// let procedure = Dfa::builder()
///     .default_color(true)
///     .with_edges([(0, 'a', 1), (0, 'S', 1), (1, 'R', 2)])
///     .into_dfa(0);
/// let sba = StackSba::new(alphabet, Some('S'), [('S', procedure)]);
/// assert!(sba.accepts(&['S', 'S', 'a', 'R', 'R']));
/// assert!(!sba.accepts(&['S', 'R', 'a']));
/// ```
pub trait Sba {
    /// The raw input symbols.
    type Symbol: Symbol;
    /// The acceptor representing a single procedure, viewed over the raw input symbols.
    type Procedure<'a>: Acceptor<Symbol = Self::Symbol>
    where
        Self: 'a;

    /// The partitioned input alphabet.
    fn alphabet(&self) -> &SbaAlphabet<Self::Symbol>;

    /// The call symbol a word must start with, or `None` if the system accepts no non-empty word.
    fn initial_procedure(&self) -> Option<Self::Symbol>;

    /// Returns the procedure that is invoked by `call`, if it exists.
    fn procedure(&self, call: Self::Symbol) -> Option<Self::Procedure<'_>>;

    /// Iterates over all procedures together with their call symbols.
    fn procedures(&self) -> impl Iterator<Item = (Self::Symbol, Self::Procedure<'_>)> + '_;

    /// The configuration before reading anything.
    fn initial_state(&self) -> SbaState<Self::Symbol> {
        SbaState::Init
    }

    /// Computes the configuration that is reached from `state` by reading `symbol`.
    fn transition(
        &self,
        state: &SbaState<Self::Symbol>,
        symbol: Self::Symbol,
    ) -> SbaState<Self::Symbol> {
        let frame = match state {
            SbaState::Sink | SbaState::Term => return SbaState::Sink,
            SbaState::Init => None,
            SbaState::Active(frame) => Some(frame.as_ref()),
        };

        match self.alphabet().symbol_type(symbol) {
            Some(SymbolType::Internal) => match frame.and_then(|f| advance(self, f, symbol)) {
                Some(updated) => SbaState::Active(Rc::new(updated)),
                None => SbaState::Sink,
            },
            Some(SymbolType::Call) => {
                if frame.is_none() && self.initial_procedure() != Some(symbol) {
                    return SbaState::Sink;
                }
                let Some(entry) = self.procedure(symbol).and_then(|p| p.initial()) else {
                    return SbaState::Sink;
                };
                let below = match frame {
                    None => None,
                    Some(f) => match advance(self, f, symbol) {
                        Some(updated) => Some(Rc::new(updated)),
                        None => return SbaState::Sink,
                    },
                };
                SbaState::Active(Rc::new(Frame {
                    procedure: symbol,
                    state: entry,
                    below,
                }))
            }
            Some(SymbolType::Return) => match frame.and_then(|f| advance(self, f, symbol)) {
                Some(Frame { below: Some(b), .. }) => SbaState::Active(b),
                Some(Frame { below: None, .. }) => SbaState::Term,
                None => SbaState::Sink,
            },
            None => SbaState::Sink,
        }
    }

    /// Returns true if `state` is accepting.
    fn is_accepting(&self, state: &SbaState<Self::Symbol>) -> bool {
        match state {
            SbaState::Sink => false,
            SbaState::Init | SbaState::Term => true,
            SbaState::Active(frame) => self
                .procedure(frame.procedure)
                .map(|p| p.is_accepting(frame.state))
                .unwrap_or(false),
        }
    }

    /// Computes the configuration that is reached by reading `word` from the initial state.
    fn reached_state(&self, word: &[Self::Symbol]) -> SbaState<Self::Symbol> {
        let mut state = self.initial_state();
        for sym in word {
            state = self.transition(&state, *sym);
            if state.is_sink() {
                break;
            }
        }
        state
    }

    /// Returns true if the system accepts `word`.
    fn accepts(&self, word: &[Self::Symbol]) -> bool {
        let state = self.reached_state(word);
        trace!("word {} reaches {:?}", word.show(), state);
        self.is_accepting(&state)
    }

    /// The size of the system, which is the sum of the sizes of all procedures.
    fn size(&self) -> usize {
        self.procedures().map(|(_, p)| p.size()).sum()
    }
}

impl<A: Sba + ?Sized> Sba for &A {
    type Symbol = A::Symbol;
    type Procedure<'a> = A::Procedure<'a> where Self: 'a;

    fn alphabet(&self) -> &SbaAlphabet<A::Symbol> {
        A::alphabet(self)
    }

    fn initial_procedure(&self) -> Option<A::Symbol> {
        A::initial_procedure(self)
    }

    fn procedure(&self, call: A::Symbol) -> Option<Self::Procedure<'_>> {
        A::procedure(self, call)
    }

    fn procedures(&self) -> impl Iterator<Item = (A::Symbol, Self::Procedure<'_>)> + '_ {
        A::procedures(self)
    }
}

/// Moves the top frame along `symbol` in its own procedure. Fails if the procedure does not
/// exist, the transition is undefined or leads to a rejecting local state.
fn advance<A: Sba + ?Sized>(
    sba: &A,
    frame: &Frame<A::Symbol>,
    symbol: A::Symbol,
) -> Option<Frame<A::Symbol>> {
    let procedure = sba.procedure(frame.procedure)?;
    let next = procedure.successor(frame.state, symbol)?;
    procedure.is_accepting(next).then(|| frame.with_state(next))
}

/// An SBA which stores one acceptor over the raw input symbols per call symbol.
#[derive(Clone)]
pub struct StackSba<I: Symbol, D = Dfa<I>> {
    alphabet: SbaAlphabet<I>,
    initial_call: Option<I>,
    procedures: OrderedMap<I, D>,
}

impl<I: Symbol, D: Acceptor<Symbol = I>> StackSba<I, D> {
    /// Creates a new system from the given procedures.
    ///
    /// # Panics
    /// If a procedure is registered for a symbol that is not a call symbol of `alphabet`.
    pub fn new<X: IntoIterator<Item = (I, D)>>(
        alphabet: SbaAlphabet<I>,
        initial_call: Option<I>,
        procedures: X,
    ) -> Self {
        let procedures: OrderedMap<I, D> = procedures.into_iter().collect();
        for call in procedures.keys() {
            assert!(
                alphabet.is_call(*call),
                "procedure {} is registered for a non-call symbol",
                call.show()
            );
        }
        Self {
            alphabet,
            initial_call,
            procedures,
        }
    }

    /// Gives mutable access to the procedure of `call`.
    pub fn procedure_mut(&mut self, call: I) -> Option<&mut D> {
        self.procedures.get_mut(&call)
    }
}

impl<I: Symbol, D: Acceptor<Symbol = I>> Sba for StackSba<I, D> {
    type Symbol = I;
    type Procedure<'a> = &'a D where Self: 'a;

    fn alphabet(&self) -> &SbaAlphabet<I> {
        &self.alphabet
    }

    fn initial_procedure(&self) -> Option<I> {
        self.initial_call
    }

    fn procedure(&self, call: I) -> Option<&D> {
        self.procedures.get(&call)
    }

    fn procedures(&self) -> impl Iterator<Item = (I, &D)> + '_ {
        self.procedures.iter().map(|(call, p)| (*call, p))
    }
}

impl<I: Symbol, D: Debug> Debug for StackSba<I, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SBA over {:?}", self.alphabet)?;
        for (call, procedure) in &self.procedures {
            let marker = if self.initial_call == Some(*call) { "->" } else { "" };
            writeln!(f, "{marker}{}\n{procedure:?}", call.show())?;
        }
        Ok(())
    }
}

/// An SBA whose procedures operate on [`SymbolWrapper`]s, as they are built during learning.
/// The procedures are presented over the raw symbols through an [`AlphabetMapper`], which
/// determines the wrapper each raw symbol currently corresponds to.
#[derive(Clone)]
pub struct MappedStackSba<I: Symbol> {
    alphabet: SbaAlphabet<I>,
    initial_call: Option<I>,
    procedures: OrderedMap<I, Dfa<SymbolWrapper<I>>>,
    mapper: AlphabetMapper<I>,
}

impl<I: Symbol> MappedStackSba<I> {
    /// Creates a new system from procedures over wrapped symbols.
    pub fn new<X: IntoIterator<Item = (I, Dfa<SymbolWrapper<I>>)>>(
        alphabet: SbaAlphabet<I>,
        initial_call: Option<I>,
        procedures: X,
        mapper: AlphabetMapper<I>,
    ) -> Self {
        Self {
            alphabet,
            initial_call,
            procedures: procedures.into_iter().collect(),
            mapper,
        }
    }

    /// Creates a system without procedures, which only accepts the empty word.
    pub fn empty(alphabet: SbaAlphabet<I>, mapper: AlphabetMapper<I>) -> Self {
        Self::new(alphabet, None, [], mapper)
    }

    /// Returns the procedure of `call` over the wrapped symbols.
    pub fn local_procedure(&self, call: I) -> Option<&Dfa<SymbolWrapper<I>>> {
        self.procedures.get(&call)
    }

    /// The mapping from raw symbols to wrappers.
    pub fn mapper(&self) -> &AlphabetMapper<I> {
        &self.mapper
    }
}

/// View of a procedure of a [`MappedStackSba`] over the raw symbols. Symbols that have no
/// wrapper have no transitions.
#[derive(Clone, Copy)]
pub struct MappedProcedure<'a, I: Symbol> {
    dfa: &'a Dfa<SymbolWrapper<I>>,
    mapper: &'a AlphabetMapper<I>,
}

impl<'a, I: Symbol> MappedProcedure<'a, I> {
    /// The underlying acceptor over wrapped symbols.
    pub fn local(&self) -> &'a Dfa<SymbolWrapper<I>> {
        self.dfa
    }
}

impl<I: Symbol> Acceptor for MappedProcedure<'_, I> {
    type Symbol = I;

    fn initial(&self) -> Option<StateIndex> {
        self.dfa.initial()
    }

    fn successor(&self, state: StateIndex, symbol: I) -> Option<StateIndex> {
        self.dfa.successor(state, self.mapper.get(symbol)?)
    }

    fn is_accepting(&self, state: StateIndex) -> bool {
        self.dfa.is_accepting(state)
    }

    fn size(&self) -> usize {
        self.dfa.size()
    }
}

impl<I: Symbol> Sba for MappedStackSba<I> {
    type Symbol = I;
    type Procedure<'a> = MappedProcedure<'a, I> where Self: 'a;

    fn alphabet(&self) -> &SbaAlphabet<I> {
        &self.alphabet
    }

    fn initial_procedure(&self) -> Option<I> {
        self.initial_call
    }

    fn procedure(&self, call: I) -> Option<MappedProcedure<'_, I>> {
        self.procedures.get(&call).map(|dfa| MappedProcedure {
            dfa,
            mapper: &self.mapper,
        })
    }

    fn procedures(&self) -> impl Iterator<Item = (I, MappedProcedure<'_, I>)> + '_ {
        self.procedures.iter().map(|(call, dfa)| {
            (
                *call,
                MappedProcedure {
                    dfa,
                    mapper: &self.mapper,
                },
            )
        })
    }
}

impl<I: Symbol> Debug for MappedStackSba<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SBA over {:?} with mapping {:?}", self.alphabet, self.mapper)?;
        for (call, procedure) in &self.procedures {
            let marker = if self.initial_call == Some(*call) { "->" } else { "" };
            writeln!(f, "{marker}{}\n{procedure:?}", call.show())?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn word(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    pub(crate) fn s_procedure() -> Dfa<char> {
        Dfa::builder()
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
            .into_dfa(0)
    }

    pub(crate) fn t_procedure() -> Dfa<char> {
        Dfa::builder()
            .default_color(true)
            .with_edges([
                (0, 'S', 3),
                (0, 'c', 1),
                (1, 'T', 2),
                (1, 'R', 4),
                (2, 'c', 3),
                (3, 'R', 4),
            ])
            .into_dfa(0)
    }

    pub(crate) fn alphabet() -> SbaAlphabet<char> {
        SbaAlphabet::new(['a', 'b', 'c'], ['S', 'T'], 'R').unwrap()
    }

    /// The palindrome-like system with procedures S and T, without completing the procedures.
    pub(crate) fn partial_system() -> StackSba<char> {
        StackSba::new(
            alphabet(),
            Some('S'),
            [('S', s_procedure()), ('T', t_procedure())],
        )
    }

    pub(crate) fn complete_system() -> StackSba<char> {
        let alphabet = alphabet();
        let mut s = s_procedure();
        let mut t = t_procedure();
        s.complete(alphabet.universe());
        t.complete(alphabet.universe());
        StackSba::new(alphabet, Some('S'), [('S', s), ('T', t)])
    }

    fn check_language<A: Sba<Symbol = char>>(sba: &A) {
        let positive = word("SaSTcRRaR");
        for i in 0..=positive.len() {
            assert!(sba.accepts(&positive[..i]), "{}", positive[..i].show());
        }

        for negative in ["T", "abc", "Sc", "SaRS", "SaRa", "SaaRa", "SaRR", "SaSRR"] {
            assert!(!sba.accepts(&word(negative)), "{negative}");
        }
    }

    #[test_log::test]
    fn partial_acceptance() {
        check_language(&partial_system());
    }

    #[test_log::test]
    fn complete_acceptance() {
        let sba = complete_system();
        check_language(&sba);
        assert_eq!(sba.size(), 14);
        assert_eq!(partial_system().size(), 12);
    }

    #[test]
    fn stack_discipline() {
        let sba = partial_system();
        let alphabet = sba.alphabet().clone();
        let w = word("SaSTcRRaR");

        let mut state = sba.initial_state();
        for (i, sym) in w.iter().enumerate() {
            state = sba.transition(&state, *sym);
            let pending = alphabet.pending_calls(&w[..=i]).unwrap();
            assert_eq!(state.stack_depth(), pending, "after {}", w[..=i].show());
        }
        assert_eq!(state, SbaState::Term);
        assert_eq!(sba.transition(&state, 'a'), SbaState::Sink);
        assert_eq!(sba.transition(&SbaState::Sink, 'S'), SbaState::Sink);
        assert!(!sba.is_accepting(&SbaState::Sink));
        assert!(sba.is_accepting(&SbaState::Init));
    }

    #[test]
    fn transitions_are_deterministic() {
        let sba = partial_system();
        let first = sba.reached_state(&word("SaST"));
        let second = sba.reached_state(&word("SaST"));
        assert_eq!(first, second);
        let top = first.top().unwrap();
        assert_eq!(top.procedure(), 'T');
        assert_eq!(top.state(), 0);
        assert_eq!(top.below().map(|f| (f.procedure(), f.state())), Some(('S', 5)));
        assert_eq!(top.depth(), 3);

        // advancing a shared state leaves the original untouched
        let advanced = sba.transition(&first, 'c');
        assert_eq!(first.top().unwrap().state(), 0);
        assert_eq!(advanced.top().unwrap().state(), 1);
    }

    #[test]
    fn illegal_symbols() {
        let sba = partial_system();
        assert_eq!(sba.reached_state(&word("x")), SbaState::Sink);
        assert_eq!(sba.reached_state(&word("Sx")), SbaState::Sink);
        assert_eq!(sba.reached_state(&word("R")), SbaState::Sink);
        assert_eq!(sba.reached_state(&word("a")), SbaState::Sink);
        // procedure without initial state
        let sba = StackSba::new(alphabet(), Some('S'), [('S', Dfa::<char>::new())]);
        assert!(!sba.accepts(&word("S")));
        // no initial procedure
        let sba = StackSba::new(alphabet(), None, [('S', s_procedure())]);
        assert!(sba.accepts(&[]));
        assert!(!sba.accepts(&word("S")));
    }

    #[test]
    fn mapped_view() {
        let alphabet = alphabet();
        let mut mapper = AlphabetMapper::new(&alphabet);
        let wrap = |c: char, mapper: &AlphabetMapper<char>| mapper.get(c).unwrap();

        let old_t = wrap('T', &mapper);
        let t = mapper.upgrade('T').unwrap();
        let s = mapper.upgrade('S').unwrap();
        let a = wrap('a', &mapper);
        let r = wrap('R', &mapper);

        let procedure_s = Dfa::builder()
            .default_color(true)
            .with_edges([(0, a, 0), (0, t, 1), (0, old_t, 2), (0, r, 3), (1, r, 3)])
            .into_dfa(0);
        let procedure_t = Dfa::builder()
            .default_color(true)
            .with_edges([(0, s, 1), (0, r, 2), (1, r, 2)])
            .into_dfa(0);
        let sba = MappedStackSba::new(
            alphabet.clone(),
            Some('S'),
            [('S', procedure_s), ('T', procedure_t)],
            mapper.clone(),
        );

        assert!(sba.accepts(&word("SaaTRR")));
        assert!(sba.accepts(&word("STSRRR")));
        assert!(!sba.accepts(&word("STRaR")));
        assert!(!sba.accepts(&word("Sb")));
        assert_eq!(sba.size(), 7);
        assert_eq!(
            sba.procedure('S').map(|p| p.successor(0, 'T')),
            Some(Some(1))
        );
        assert_eq!(sba.local_procedure('T').map(Dfa::size), Some(3));

        let empty = MappedStackSba::empty(alphabet, mapper);
        assert!(empty.accepts(&[]));
        assert!(!empty.accepts(&word("S")));
        assert_eq!(empty.size(), 0);
    }
}

use sba::prelude::*;
use tracing::{debug, trace};

use crate::procedural::AccessSequenceTransformer;

/// The call symbols for which a scan found a first access sequence or a first terminating
/// sequence, each in the order in which they occur in the scanned word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discoveries<I> {
    /// Calls that were invoked for the first time.
    pub new_calls: Vec<I>,
    /// Calls that were seen terminating for the first time.
    pub new_terminations: Vec<I>,
}

impl<I> Default for Discoveries<I> {
    fn default() -> Self {
        Self {
            new_calls: vec![],
            new_terminations: vec![],
        }
    }
}

impl<I> Discoveries<I> {
    /// Returns true if nothing new was discovered.
    pub fn is_empty(&self) -> bool {
        self.new_calls.is_empty() && self.new_terminations.is_empty()
    }
}

/// Manages access sequences and terminating sequences of procedures.
///
/// The access sequence of a procedure `c` is a global word after which `c` may be invoked, the
/// terminating sequence of `c` is a word that `c` reads before it may return. Both are extracted
/// from words that are accepted by the system under learning, so every recorded sequence is a
/// genuine witness and embedding a local word with them never changes the verdict of a query.
pub trait AtProvider<I: Symbol> {
    /// The access sequence of `procedure`.
    ///
    /// # Panics
    /// If no access sequence for `procedure` has been recorded yet.
    fn access_sequence(&self, procedure: I) -> &[I];

    /// The terminating sequence of `procedure`.
    ///
    /// # Panics
    /// If no terminating sequence for `procedure` has been recorded yet.
    fn terminating_sequence(&self, procedure: I) -> &[I];

    /// Returns true if a terminating sequence for `procedure` is known.
    fn has_terminating_sequence(&self, procedure: I) -> bool;

    /// Extracts access and terminating sequences from a word that is accepted by the system under
    /// learning.
    fn scan_positive_counterexample(&mut self, input: &[I]) -> Discoveries<I>;

    /// Inspects the given hypotheses of procedures for terminating sequences, using the access
    /// sequence transformers of the learners in `transformers` and the local alphabet `inputs`.
    /// Returns the calls whose terminating sequence was recorded or replaced.
    fn scan_refined_procedures<L: AccessSequenceTransformer<SymbolWrapper<I>>>(
        &mut self,
        procedures: &[(I, &Dfa<SymbolWrapper<I>>)],
        transformers: &math::OrderedMap<I, L>,
        inputs: &[SymbolWrapper<I>],
    ) -> Vec<I>;
}

/// Records the first access sequence and the first terminating sequence that is found for each
/// procedure and never replaces them.
#[derive(Debug, Clone)]
pub struct DefaultAtProvider<I: Symbol> {
    alphabet: SbaAlphabet<I>,
    access: math::OrderedMap<I, Vec<I>>,
    terminating: math::OrderedMap<I, Vec<I>>,
}

impl<I: Symbol> DefaultAtProvider<I> {
    /// Creates a provider that has not recorded anything yet.
    pub fn new(alphabet: SbaAlphabet<I>) -> Self {
        Self {
            alphabet,
            access: math::OrderedMap::default(),
            terminating: math::OrderedMap::default(),
        }
    }

    /// The alphabet of the system under learning.
    pub fn alphabet(&self) -> &SbaAlphabet<I> {
        &self.alphabet
    }

    fn record_terminating(&mut self, procedure: I, sequence: Vec<I>) {
        trace!(
            "terminating sequence of {} is {}",
            procedure.show(),
            sequence.show()
        );
        self.terminating.insert(procedure, sequence);
    }
}

impl<I: Symbol> AtProvider<I> for DefaultAtProvider<I> {
    fn access_sequence(&self, procedure: I) -> &[I] {
        self.access
            .get(&procedure)
            .unwrap_or_else(|| panic!("no access sequence for {}", procedure.show()))
    }

    fn terminating_sequence(&self, procedure: I) -> &[I] {
        self.terminating
            .get(&procedure)
            .unwrap_or_else(|| panic!("no terminating sequence for {}", procedure.show()))
    }

    fn has_terminating_sequence(&self, procedure: I) -> bool {
        self.terminating.contains_key(&procedure)
    }

    fn scan_positive_counterexample(&mut self, input: &[I]) -> Discoveries<I> {
        let mut out = Discoveries::default();

        for (i, sym) in input.iter().enumerate() {
            if !self.alphabet.is_call(*sym) {
                continue;
            }

            if !self.access.contains_key(sym) {
                trace!("access sequence of {} is {}", sym.show(), input[..i].show());
                self.access.insert(*sym, input[..i].to_vec());
                out.new_calls.push(*sym);
            }

            if self.terminating.contains_key(sym) {
                continue;
            }
            if let Some(ret) = self.alphabet.find_return_index(input, i + 1) {
                self.record_terminating(*sym, input[i + 1..ret].to_vec());
                out.new_terminations.push(*sym);
            }
        }

        if !out.is_empty() {
            debug!(
                "scan found calls {} and terminations {}",
                out.new_calls.show(),
                out.new_terminations.show()
            );
        }
        out
    }

    fn scan_refined_procedures<L: AccessSequenceTransformer<SymbolWrapper<I>>>(
        &mut self,
        _procedures: &[(I, &Dfa<SymbolWrapper<I>>)],
        _transformers: &math::OrderedMap<I, L>,
        _inputs: &[SymbolWrapper<I>],
    ) -> Vec<I> {
        vec![]
    }
}

/// Works as [`DefaultAtProvider`], but keeps terminating sequences short. Positive counterexamples
/// replace a stored terminating sequence whenever they contain a shorter one. Moreover, refined
/// hypotheses are searched for states from which the procedure may return: the representative of
/// such a state, with every usable call expanded into the call, its terminating sequence and the
/// return symbol, is a terminating sequence itself.
///
/// Short terminating sequences keep the embedded membership queries short, since every usable call
/// in a local query is expanded with them.
#[derive(Debug, Clone)]
pub struct OptimizingAtProvider<I: Symbol> {
    inner: DefaultAtProvider<I>,
}

impl<I: Symbol> OptimizingAtProvider<I> {
    /// Creates a provider that has not recorded anything yet.
    pub fn new(alphabet: SbaAlphabet<I>) -> Self {
        Self {
            inner: DefaultAtProvider::new(alphabet),
        }
    }

    fn improves(&self, procedure: I, candidate: &[I]) -> bool {
        self.inner
            .terminating
            .get(&procedure)
            .map_or(true, |current| candidate.len() < current.len())
    }

    /// Translates a local word into the global word it stands for, or `None` if it contains a call
    /// that can not be expanded or a return symbol.
    fn expand(&self, local: &[SymbolWrapper<I>]) -> Option<Vec<I>> {
        let mut out = Vec::with_capacity(local.len());
        for sym in local {
            match sym.kind() {
                SymbolType::Internal => out.push(sym.symbol()),
                SymbolType::Call if sym.is_usable() => {
                    let term = self.inner.terminating.get(&sym.symbol())?;
                    out.push(sym.symbol());
                    out.extend_from_slice(term);
                    out.push(self.inner.alphabet.return_symbol());
                }
                SymbolType::Call | SymbolType::Return => return None,
            }
        }
        Some(out)
    }
}

impl<I: Symbol> AtProvider<I> for OptimizingAtProvider<I> {
    fn access_sequence(&self, procedure: I) -> &[I] {
        self.inner.access_sequence(procedure)
    }

    fn terminating_sequence(&self, procedure: I) -> &[I] {
        self.inner.terminating_sequence(procedure)
    }

    fn has_terminating_sequence(&self, procedure: I) -> bool {
        self.inner.has_terminating_sequence(procedure)
    }

    fn scan_positive_counterexample(&mut self, input: &[I]) -> Discoveries<I> {
        let out = self.inner.scan_positive_counterexample(input);

        for (i, sym) in input.iter().enumerate() {
            if !self.inner.alphabet.is_call(*sym) {
                continue;
            }
            if let Some(ret) = self.inner.alphabet.find_return_index(input, i + 1) {
                let candidate = &input[i + 1..ret];
                if self.improves(*sym, candidate) {
                    self.inner.record_terminating(*sym, candidate.to_vec());
                }
            }
        }
        out
    }

    fn scan_refined_procedures<L: AccessSequenceTransformer<SymbolWrapper<I>>>(
        &mut self,
        procedures: &[(I, &Dfa<SymbolWrapper<I>>)],
        transformers: &math::OrderedMap<I, L>,
        inputs: &[SymbolWrapper<I>],
    ) -> Vec<I> {
        let Some(ret) = inputs.iter().find(|sym| sym.is_return()).copied() else {
            return vec![];
        };
        let mut out = vec![];

        for (procedure, dfa) in procedures {
            let Some(transformer) = transformers.get(procedure) else {
                continue;
            };

            for access in dfa.state_cover(inputs) {
                let representative = transformer.transform_access_sequence(&access);
                let returns = dfa
                    .reached_state(&representative)
                    .filter(|q| dfa.is_accepting(*q))
                    .and_then(|q| dfa.successor(q, ret))
                    .is_some_and(|q| dfa.is_accepting(q));
                if !returns {
                    continue;
                }

                let Some(candidate) = self.expand(&representative) else {
                    continue;
                };
                if self.improves(*procedure, &candidate) {
                    self.inner.record_terminating(*procedure, candidate);
                    if !out.contains(procedure) {
                        out.push(*procedure);
                    }
                }
            }
        }

        if !out.is_empty() {
            debug!("refined procedures yield terminating sequences for {}", out.show());
        }
        out
    }
}

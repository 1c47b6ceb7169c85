use std::fmt::Debug;

use itertools::Itertools;
use thiserror::Error;

use crate::{math::Map, Show, Symbol};

/// The category a symbol of an [`SbaAlphabet`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SymbolType {
    /// Invokes the procedure of the same name.
    Call,
    /// Is consumed by the currently active procedure.
    Internal,
    /// Terminates the currently active procedure.
    Return,
}

/// Errors that can occur when constructing an [`SbaAlphabet`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AlphabetError {
    /// A symbol was declared more than once within the same category.
    #[error("symbol `{0}` is declared more than once")]
    Duplicate(String),
    /// A symbol was declared in two different categories.
    #[error("symbol `{symbol}` is declared both as {first:?} and as {second:?} symbol")]
    Overlap {
        /// Rendering of the offending symbol.
        symbol: String,
        /// The category in which the symbol was declared first.
        first: SymbolType,
        /// The category in which the symbol was declared again.
        second: SymbolType,
    },
}

/// The input alphabet of a system of behavioral automata. It is partitioned into internal symbols,
/// call symbols and exactly one return symbol. The symbols of a procedure (its *procedural alphabet*)
/// are the internal symbols and the call symbols.
///
/// # Example
/// ```
/// use sba::prelude::*;
/// let alphabet = SbaAlphabet::new(['a', 'b'], ['S'], 'R').unwrap();
/// assert!(alphabet.is_call('S'));
/// assert_eq!(alphabet.size(), 4);
/// assert!(SbaAlphabet::new(['a'], ['a'], 'R').is_err());
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct SbaAlphabet<I: Symbol> {
    internals: Vec<I>,
    calls: Vec<I>,
    return_symbol: I,
    types: Map<I, SymbolType>,
}

impl<I: Symbol> SbaAlphabet<I> {
    /// Creates a new alphabet from the given internal symbols, call symbols and return symbol.
    /// Fails if a symbol is declared twice.
    pub fn new<X, Y>(internals: X, calls: Y, return_symbol: I) -> Result<Self, AlphabetError>
    where
        X: IntoIterator<Item = I>,
        Y: IntoIterator<Item = I>,
    {
        let internals = internals.into_iter().collect_vec();
        let calls = calls.into_iter().collect_vec();
        let mut types = Map::default();

        let declarations = internals
            .iter()
            .map(|i| (*i, SymbolType::Internal))
            .chain(calls.iter().map(|c| (*c, SymbolType::Call)))
            .chain(std::iter::once((return_symbol, SymbolType::Return)));

        for (symbol, kind) in declarations {
            if let Some(first) = types.insert(symbol, kind) {
                return Err(if first == kind {
                    AlphabetError::Duplicate(symbol.show())
                } else {
                    AlphabetError::Overlap {
                        symbol: symbol.show(),
                        first,
                        second: kind,
                    }
                });
            }
        }

        Ok(Self {
            internals,
            calls,
            return_symbol,
            types,
        })
    }

    /// Returns the category of the given symbol, or `None` if it does not belong to the alphabet.
    pub fn symbol_type(&self, symbol: I) -> Option<SymbolType> {
        self.types.get(&symbol).copied()
    }

    /// Returns true if `symbol` is an internal symbol.
    pub fn is_internal(&self, symbol: I) -> bool {
        self.symbol_type(symbol) == Some(SymbolType::Internal)
    }

    /// Returns true if `symbol` is a call symbol.
    pub fn is_call(&self, symbol: I) -> bool {
        self.symbol_type(symbol) == Some(SymbolType::Call)
    }

    /// Returns true if `symbol` is the return symbol.
    pub fn is_return(&self, symbol: I) -> bool {
        symbol == self.return_symbol
    }

    /// Returns true if `symbol` belongs to the alphabet.
    pub fn contains(&self, symbol: I) -> bool {
        self.types.contains_key(&symbol)
    }

    /// The internal symbols, in declaration order.
    pub fn internals(&self) -> &[I] {
        &self.internals
    }

    /// The call symbols, in declaration order.
    pub fn calls(&self) -> &[I] {
        &self.calls
    }

    /// The return symbol.
    pub fn return_symbol(&self) -> I {
        self.return_symbol
    }

    /// Iterates over the procedural alphabet, i.e. the internal symbols followed by the call symbols.
    pub fn procedural_symbols(&self) -> impl Iterator<Item = I> + '_ {
        self.internals.iter().chain(self.calls.iter()).copied()
    }

    /// Iterates over all symbols: internal symbols, call symbols and finally the return symbol.
    pub fn universe(&self) -> impl Iterator<Item = I> + '_ {
        self.procedural_symbols()
            .chain(std::iter::once(self.return_symbol))
    }

    /// Returns the number of symbols in the alphabet.
    pub fn size(&self) -> usize {
        self.types.len()
    }

    /// Searches backwards from `idx` (exclusive) for the call symbol that is still pending at
    /// position `idx`, i.e. the nearest call whose matching return does not occur before `idx`.
    /// Returns its position, or `None` if no call is pending.
    pub fn find_call_index(&self, word: &[I], idx: usize) -> Option<usize> {
        let mut balance = 0usize;
        for i in (0..idx.min(word.len())).rev() {
            match self.symbol_type(word[i]) {
                Some(SymbolType::Return) => balance += 1,
                Some(SymbolType::Call) => {
                    if balance == 0 {
                        return Some(i);
                    }
                    balance -= 1;
                }
                _ => {}
            }
        }
        None
    }

    /// Searches forwards from `idx` (inclusive) for the return symbol that terminates the procedure
    /// which is active at position `idx`, skipping over nested call/return pairs. Returns its position,
    /// or `None` if the procedure does not return within `word`.
    pub fn find_return_index(&self, word: &[I], idx: usize) -> Option<usize> {
        let mut balance = 0usize;
        for (i, sym) in word.iter().enumerate().skip(idx) {
            match self.symbol_type(*sym) {
                Some(SymbolType::Call) => balance += 1,
                Some(SymbolType::Return) => {
                    if balance == 0 {
                        return Some(i);
                    }
                    balance -= 1;
                }
                _ => {}
            }
        }
        None
    }

    /// Collapses every terminated procedure invocation (a call symbol, the word it processes and its
    /// matching return) into just the call symbol. Pending calls are kept as they are, such that the
    /// result describes what the outermost procedure sees locally.
    ///
    /// # Example
    /// ```
    /// use sba::prelude::*;
    /// let alphabet = SbaAlphabet::new(['a', 'b'], ['S', 'T'], 'R').unwrap();
    /// let word: Vec<_> = "aSbTaRRbS".chars().collect();
    /// assert_eq!(alphabet.normalize(&word), "aSbS".chars().collect::<Vec<_>>());
    /// ```
    pub fn normalize(&self, word: &[I]) -> Vec<I> {
        let mut out = Vec::with_capacity(word.len());
        let mut i = 0;
        while i < word.len() {
            let sym = word[i];
            out.push(sym);
            i = match self.is_call(sym) {
                true => self
                    .find_return_index(word, i + 1)
                    .map_or(i + 1, |ret| ret + 1),
                false => i + 1,
            };
        }
        out
    }

    /// Returns the number of calls in `word` that are still pending after reading all of it, or
    /// `None` if `word` contains a return that does not match any call.
    pub fn pending_calls(&self, word: &[I]) -> Option<usize> {
        let mut pending = 0usize;
        for sym in word {
            match self.symbol_type(*sym) {
                Some(SymbolType::Call) => pending += 1,
                Some(SymbolType::Return) => pending = pending.checked_sub(1)?,
                _ => {}
            }
        }
        Some(pending)
    }
}

impl<I: Symbol> Debug for SbaAlphabet<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "internal {{{}}}, call {{{}}}, return {}",
            self.internals.iter().map(Show::show).join(", "),
            self.calls.iter().map(Show::show).join(", "),
            self.return_symbol.show()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alphabet() -> SbaAlphabet<char> {
        SbaAlphabet::new(['a', 'b', 'c'], ['S', 'T'], 'R').unwrap()
    }

    fn word(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn partitioning() {
        let alphabet = alphabet();
        assert_eq!(alphabet.symbol_type('a'), Some(SymbolType::Internal));
        assert_eq!(alphabet.symbol_type('T'), Some(SymbolType::Call));
        assert_eq!(alphabet.symbol_type('R'), Some(SymbolType::Return));
        assert_eq!(alphabet.symbol_type('x'), None);
        assert_eq!(
            alphabet.procedural_symbols().collect::<String>(),
            "abcST".to_string()
        );
        assert_eq!(alphabet.universe().collect::<String>(), "abcSTR");
        assert_eq!(alphabet.size(), 6);
    }

    #[test]
    fn invalid_alphabets() {
        assert_eq!(
            SbaAlphabet::new(['a', 'a'], ['S'], 'R'),
            Err(AlphabetError::Duplicate("a".to_string()))
        );
        assert!(matches!(
            SbaAlphabet::new(['a'], ['S'], 'S'),
            Err(AlphabetError::Overlap {
                first: SymbolType::Call,
                second: SymbolType::Return,
                ..
            })
        ));
    }

    #[test]
    fn call_and_return_indices() {
        let alphabet = alphabet();
        let w = word("SaSTcRRaR");
        assert_eq!(alphabet.find_call_index(&w, 4), Some(3));
        assert_eq!(alphabet.find_call_index(&w, 6), Some(2));
        assert_eq!(alphabet.find_call_index(&w, 7), Some(0));
        assert_eq!(alphabet.find_call_index(&w, 0), None);

        assert_eq!(alphabet.find_return_index(&w, 1), Some(8));
        assert_eq!(alphabet.find_return_index(&w, 3), Some(6));
        assert_eq!(alphabet.find_return_index(&w, 4), Some(5));
        assert_eq!(alphabet.find_return_index(&word("SaS"), 1), None);
    }

    #[test]
    fn normalization() {
        let alphabet = alphabet();
        assert_eq!(alphabet.normalize(&word("aSTcRRa")), word("aSa"));
        assert_eq!(alphabet.normalize(&word("aSTc")), word("aSTc"));
        assert_eq!(alphabet.normalize(&word("")), word(""));
    }

    #[test]
    fn pending() {
        let alphabet = alphabet();
        assert_eq!(alphabet.pending_calls(&word("SaSTcRR")), Some(1));
        assert_eq!(alphabet.pending_calls(&word("SaRR")), None);
    }
}

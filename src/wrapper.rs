use std::fmt::Debug;

use itertools::Itertools;

use crate::{alphabet::SbaAlphabet, alphabet::SymbolType, math::OrderedMap, Show, Symbol};

/// A symbol as it is seen by a single procedure during learning. Besides the raw symbol, it
/// stores the category of the symbol and, for call symbols, whether the called procedure is known
/// to terminate. Calls of procedures that are not known to terminate can not be expanded into
/// a complete invocation, they are hence only allowed as the last symbol of a local word.
///
/// Two wrappers are equal if all three components agree, so upgrading a call from unusable to
/// usable results in a fresh symbol for the procedures that see it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolWrapper<I> {
    symbol: I,
    usable: bool,
    kind: SymbolType,
}

impl<I: Symbol> SymbolWrapper<I> {
    /// Wraps a call symbol with the given usability.
    pub fn call(symbol: I, usable: bool) -> Self {
        Self {
            symbol,
            usable,
            kind: SymbolType::Call,
        }
    }

    /// Wraps an internal symbol.
    pub fn internal(symbol: I) -> Self {
        Self {
            symbol,
            usable: true,
            kind: SymbolType::Internal,
        }
    }

    /// Wraps the return symbol.
    pub fn ret(symbol: I) -> Self {
        Self {
            symbol,
            usable: true,
            kind: SymbolType::Return,
        }
    }

    /// The wrapped symbol.
    pub fn symbol(&self) -> I {
        self.symbol
    }

    /// Returns true if the symbol may occur anywhere in a local word. Only calls of procedures
    /// without a known terminating sequence are not usable.
    pub fn is_usable(&self) -> bool {
        self.usable
    }

    /// The category of the wrapped symbol.
    pub fn kind(&self) -> SymbolType {
        self.kind
    }

    /// Returns true if the wrapped symbol is a call symbol.
    pub fn is_call(&self) -> bool {
        self.kind == SymbolType::Call
    }

    /// Returns true if the wrapped symbol is the return symbol.
    pub fn is_return(&self) -> bool {
        self.kind == SymbolType::Return
    }
}

impl<I: Show> Show for SymbolWrapper<I> {
    fn show(&self) -> String {
        match self.usable {
            true => self.symbol.show(),
            false => format!("{}*", self.symbol.show()),
        }
    }
}

impl<I: Show> Debug for SymbolWrapper<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.show())
    }
}

/// Associates every raw symbol of an [`SbaAlphabet`] with its current [`SymbolWrapper`]. Initially,
/// all calls are unusable. As terminating sequences are discovered, calls are upgraded with
/// [`AlphabetMapper::upgrade`].
#[derive(Clone, PartialEq, Eq)]
pub struct AlphabetMapper<I: Symbol> {
    wrappers: OrderedMap<I, SymbolWrapper<I>>,
}

impl<I: Symbol> AlphabetMapper<I> {
    /// Creates the initial mapping for `alphabet`, in which no call is usable.
    pub fn new(alphabet: &SbaAlphabet<I>) -> Self {
        let wrappers = alphabet
            .universe()
            .map(|sym| {
                let wrapper = match alphabet.symbol_type(sym) {
                    Some(SymbolType::Call) => SymbolWrapper::call(sym, false),
                    Some(SymbolType::Internal) => SymbolWrapper::internal(sym),
                    _ => SymbolWrapper::ret(sym),
                };
                (sym, wrapper)
            })
            .collect();
        Self { wrappers }
    }

    /// Returns the current wrapper of `symbol`, if the symbol is known.
    pub fn get(&self, symbol: I) -> Option<SymbolWrapper<I>> {
        self.wrappers.get(&symbol).copied()
    }

    /// Replaces the wrapper of the symbol that `wrapper` wraps.
    pub fn set(&mut self, wrapper: SymbolWrapper<I>) {
        self.wrappers.insert(wrapper.symbol(), wrapper);
    }

    /// Marks the call symbol `call` as usable. Returns the new wrapper if it differs from the
    /// previous one, and `None` if the call already was usable.
    pub fn upgrade(&mut self, call: I) -> Option<SymbolWrapper<I>> {
        let current = self.get(call)?;
        assert!(current.is_call(), "only calls can be upgraded");
        if current.is_usable() {
            return None;
        }
        let upgraded = SymbolWrapper::call(call, true);
        self.set(upgraded);
        Some(upgraded)
    }

    /// All current wrappers in alphabet order: internal symbols, calls and the return symbol.
    pub fn values(&self) -> Vec<SymbolWrapper<I>> {
        self.wrappers.values().copied().collect()
    }

    /// Translates a raw word, returning `None` if it contains an unknown symbol.
    pub fn map_word(&self, word: &[I]) -> Option<Vec<SymbolWrapper<I>>> {
        word.iter().map(|sym| self.get(*sym)).collect()
    }
}

impl<I: Symbol> Debug for AlphabetMapper<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}]",
            self.wrappers
                .iter()
                .map(|(sym, wrapper)| format!("{} -> {}", sym.show(), wrapper.show()))
                .join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upgrading_calls() {
        let alphabet = SbaAlphabet::new(['a'], ['S', 'T'], 'R').unwrap();
        let mut mapper = AlphabetMapper::new(&alphabet);

        assert_eq!(
            mapper.values(),
            vec![
                SymbolWrapper::internal('a'),
                SymbolWrapper::call('S', false),
                SymbolWrapper::call('T', false),
                SymbolWrapper::ret('R')
            ]
        );
        assert_eq!(mapper.get('x'), None);

        let old = mapper.get('S').unwrap();
        let new = mapper.upgrade('S').unwrap();
        assert_ne!(old, new);
        assert!(new.is_usable());
        assert_eq!(mapper.upgrade('S'), None);
        assert_eq!(mapper.get('S'), Some(new));
        assert_eq!(mapper.values().len(), 4);

        assert_eq!(
            mapper.map_word(&['S', 'T', 'a']).unwrap().show(),
            "\"ST*a\""
        );
        assert_eq!(mapper.map_word(&['S', 'x']), None);
    }
}

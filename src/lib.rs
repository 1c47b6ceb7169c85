//! Library for working with systems of behavioral automata (SBAs) in Rust.
//!
//! An SBA is a collection of procedures, each of which is a finite acceptor, that are glued together
//! by a stack discipline mimicking call/return semantics. The input alphabet of such a system is
//! partitioned into call symbols (each invoking the procedure of the same name), internal symbols
//! (consumed by the currently active procedure) and a single return symbol (terminating the currently
//! active procedure). See [`alphabet::SbaAlphabet`].
//!
//! Procedures are represented as (possibly partial) deterministic acceptors, see [`dfa::Dfa`] and the
//! more general [`dfa::Acceptor`] trait. The most important trait is [`sba::Sba`], which provides the
//! stack based semantics on top of a lookup from call symbols to procedures. It is implemented by
//! - [`sba::StackSba`], which directly stores one acceptor per call symbol, and
//! - [`sba::MappedStackSba`], whose procedures operate on [`wrapper::SymbolWrapper`]s and which is
//!   presented to the outside through an [`wrapper::AlphabetMapper`]. This is the representation
//!   produced by active learning, where the symbols of a procedure change during the learning process.
//!
//! Two systems can be checked for language equivalence with [`equivalence::find_separating_word`].
//! Random systems can be generated with the functions in the `random` module, which is gated behind
//! the `random` feature.
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// The prelude is supposed to make using this package easier. Including everything, i.e.
/// `use sba::prelude::*;` should be enough to use the package.
pub mod prelude {
    pub use super::{
        alphabet::{AlphabetError, SbaAlphabet, SymbolType},
        dfa::{Acceptor, Dfa, DfaBuilder, StateIndex},
        equivalence::{equivalent, find_separating_word},
        math,
        sba::{Frame, MappedProcedure, MappedStackSba, Sba, SbaState, StackSba},
        wrapper::{AlphabetMapper, SymbolWrapper},
        Show, Symbol,
    };
}

/// This module contains type aliases for the collections which are used throughout the crate.
pub mod math;

mod show;
pub use show::Show;

/// Defines the partitioned alphabet of an SBA together with helpers for working with
/// nested call/return words.
pub mod alphabet;

/// Defines finite acceptors, which serve as the procedures of an SBA.
pub mod dfa;

/// Wrapped symbols and the mapping from raw symbols to their current wrapper.
pub mod wrapper;

/// The stack based semantics of systems of behavioral automata.
pub mod sba;

/// Decides language equivalence of two systems and computes separating words.
pub mod equivalence;

/// Implements the generation of random systems.
#[cfg(feature = "random")]
pub mod random;

use std::{fmt::Debug, hash::Hash};

/// A symbol of an alphabet, which is also the type of the symbols in a word. Symbols are small
/// values (characters, integers or wrappers of those) that can be copied around freely.
pub trait Symbol: PartialEq + Eq + Debug + Copy + Ord + PartialOrd + Hash + Show {}
impl<S: PartialEq + Eq + Debug + Copy + Ord + PartialOrd + Hash + Show> Symbol for S {}

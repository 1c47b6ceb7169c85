//! Active learning of systems of behavioral automata.
//!
//! The [`learner::SbaLearner`] decomposes the task of learning an SBA into learning one finite
//! acceptor per procedure. Each procedure is learned by an arbitrary
//! [`procedural::ProceduralLearner`], for instance [`lstar::LStar`], whose membership queries are
//! embedded into global queries by a [`procedural::ProceduralMembershipOracle`]. The access and
//! terminating sequences that are needed for this embedding are managed by an
//! [`provider::AtProvider`].
#![deny(missing_docs)]

/// The prelude re-exports everything that is needed to run a learning loop.
pub mod prelude {
    pub use super::{
        learner::{LearningEvent, SbaLearner},
        lstar::{LStar, LStarProvider},
        oracle::{
            CountingOracle, EquivalenceOracle, MembershipOracle, Query, SimulatorEqOracle,
            SimulatorOracle,
        },
        procedural::{
            AccessSequenceTransformer, LearnerProvider, ProceduralLearner,
            ProceduralMembershipOracle,
        },
        provider::{AtProvider, DefaultAtProvider, Discoveries, OptimizingAtProvider},
    };
}

/// Membership and equivalence oracles together with the queries they answer.
pub mod oracle;

/// The interface between the SBA learner and the learners of single procedures.
pub mod procedural;

/// Management of access sequences and terminating sequences.
pub mod provider;

/// An implementation of L* which can be used to learn procedures.
pub mod lstar;

/// The learner for systems of behavioral automata.
pub mod learner;

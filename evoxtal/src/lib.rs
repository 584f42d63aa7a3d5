//! **evoxtal** is an evolutionary crystal-structure search engine.
//!
//! Starting from a target composition and geometric constraints, it
//! generates random and seeded unit cells, drives them through an
//! external local-optimizer back-end (the [`optimizer::LocalOptimizer`]
//! capability), and breeds new candidates from the best survivors until
//! the structure budget is exhausted.
//!
//! The numerically hard parts live in [`math`] and [`compare`]:
//! tolerance-aware Niggli reduction into a canonical cell, boundary
//! expansion of atoms near cell faces, and the equivalence comparator
//! deciding whether two periodic descriptions are the same structure
//! under re-indexing, rotation/reflection and fractional translation.
//! The evolutionary machinery lives in [`genetic`] and [`search`].

#[allow(unused_imports)]
#[macro_use]
extern crate approx;

pub mod base;
pub mod compare;
pub mod genetic;
pub mod math;
pub mod model;
pub mod optimizer;
pub mod persist;
pub mod search;

pub use base::{Cell, EvoxtalError, Lattice, RigidTransform};
pub use compare::{compare, compare_with_transform};
pub use model::{Crystal, Fingerprint, Status};
pub use optimizer::{JobState, LocalOptimizer, OptimizerKind, QueueSnapshot, SpacegroupProvider};
pub use search::{FailAction, Search, SearchEvent, SearchParams};

#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod equivalence;

pub mod hash_index;

pub mod economic_table;

/// An insertion-ordered map parameterised by a comparison strategy.
///
/// This module provides an `EconomicMap` that wraps the `EconomicTable` and
/// pairs it with the strategy its keys are compared with.
pub mod economic_map;

/// An insertion-ordered set parameterised by a comparison strategy.
pub mod economic_set;

pub use economic_map::EconomicMap;
pub use economic_set::EconomicSet;
pub use economic_table::EconomicTable;
pub use equivalence::Equivalence;
pub use hash_index::IndexWidth;

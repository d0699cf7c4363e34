pub mod accessors;
pub mod error;
pub mod fork;
pub mod misc;
pub mod mutators;
pub mod phase0;
pub mod predicates;
pub mod rewards;
pub mod shuffling;

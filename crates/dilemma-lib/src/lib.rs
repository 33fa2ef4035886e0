//! Shared pieces of the dilemma game: the rules of a match and the
//! line-oriented wire connection both sides of a match speak over.

pub mod game;
pub mod net;

//! Text-shrinking passes applied after composition.

pub mod compactor;
pub mod modifiers;
pub mod renamer;
pub mod tokens;
pub mod wrapper;

// src/core/mod.rs
mod annotations;
mod classifier;
mod composer;
mod composition;
mod engine;
mod parser;
mod pipeline;
mod project;
mod sorter;
mod symbols;
mod trimmer;
mod writer;

mod minify;

#[cfg(test)]
mod scenarios;

pub use project::discover_projects;

// Export the main engine
pub use engine::{BuildOptions, Engine, ProjectOutcome};

// src/core/pipeline.rs
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::config::{MinifyConfig, MinifyLevel};
use crate::error::{ScriptfoldError, Result};
use super::composition::Composition;
use super::minify::compactor::{CommentStripper, Compactor};
use super::minify::modifiers::ModifierReducer;
use super::minify::renamer::SymbolRenamer;
use super::minify::wrapper::LineWrapper;
use super::parser::CSharpParser;
use super::trimmer::TypeTrimmer;

/// One `Composition -> Composition` stage
pub trait Pass {
    /// Stage name used in logs and error context
    fn name(&self) -> &'static str;

    fn run(&self, composition: &Composition, parser: &mut CSharpParser) -> Result<Composition>;
}

/// Ordered stages applied after composition
pub struct Pipeline {
    passes: Vec<Box<dyn Pass + Send + Sync>>,
    cancel: Arc<AtomicBool>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            passes: Vec::new(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Stages for a minification configuration
    ///
    /// Trimming runs first so later passes see less code; renaming runs
    /// before compaction since it needs the declaration structure intact.
    pub fn for_config(minify: &MinifyConfig) -> Self {
        let mut pipeline = Self::new();
        if minify.trim_types {
            pipeline = pipeline.with_pass(TypeTrimmer);
        }
        match minify.level {
            MinifyLevel::None => pipeline,
            MinifyLevel::StripComments => pipeline.with_pass(CommentStripper),
            MinifyLevel::Lite => pipeline
                .with_pass(ModifierReducer)
                .with_pass(Compactor)
                .with_pass(LineWrapper::new(minify.line_width)),
            MinifyLevel::Full => pipeline
                .with_pass(ModifierReducer)
                .with_pass(SymbolRenamer::new(&minify.rename_alphabet))
                .with_pass(Compactor)
                .with_pass(LineWrapper::new(minify.line_width)),
        }
    }

    pub fn with_pass(mut self, pass: impl Pass + Send + Sync + 'static) -> Self {
        self.passes.push(Box::new(pass));
        self
    }

    /// Share a flag that stops the pipeline at the next stage boundary
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    pub fn run(&self, composition: Composition, parser: &mut CSharpParser) -> Result<Composition> {
        let mut current = composition;
        for pass in &self.passes {
            if self.cancel.load(Ordering::Relaxed) {
                return Err(ScriptfoldError::Cancelled { stage: pass.name() });
            }

            let started = Instant::now();
            let before = current.text().chars().count();
            current = pass.run(&current, parser).map_err(|e| e.in_stage(pass.name()))?;
            let after = current.text().chars().count();

            debug!("{} took {:?}", pass.name(), started.elapsed());
            info!("⚙️  {}: {} -> {} chars", pass.name(), before, after);
        }
        Ok(current)
    }
}

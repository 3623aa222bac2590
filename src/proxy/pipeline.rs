//! Hook registration and per-stage execution
//!
//! Hooks are registered through [`PipelineBuilder`] before the engine starts
//! serving. [`PipelineBuilder::build`] freezes the registration into an
//! immutable [`HookPipeline`] that every concurrent exchange reads without
//! locking. Within each stage hooks run in registration order, and a failing
//! hook is logged and skipped so the rest of the stage still runs.

use crate::proxy::exchange::Exchange;
use crate::proxy::fan_out::OpenSink;
use crate::proxy::hooks::{Director, HookError, Logger, Writer, WriterOutcome};
use std::sync::Arc;
use tracing::{debug, warn};

/// Immutable, ordered hook registration
#[derive(Clone, Default)]
pub struct HookPipeline {
    directors: Vec<Arc<dyn Director>>,
    writers: Vec<Arc<dyn Writer>>,
    loggers: Vec<Arc<dyn Logger>>,
}

impl HookPipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn directors(&self) -> &[Arc<dyn Director>] {
        &self.directors
    }

    pub fn writers(&self) -> &[Arc<dyn Writer>] {
        &self.writers
    }

    pub fn loggers(&self) -> &[Arc<dyn Logger>] {
        &self.loggers
    }

    pub fn is_empty(&self) -> bool {
        self.directors.is_empty() && self.writers.is_empty() && self.loggers.is_empty()
    }

    /// Run every director in order; failures are collected, never fatal.
    pub async fn run_directors(&self, exchange: &mut Exchange) -> Vec<HookError> {
        let mut failures = Vec::new();
        for director in &self.directors {
            if let Err(error) = director.direct(exchange).await {
                warn!(director = director.name(), %error, "director failed, continuing");
                failures.push(error);
            }
        }
        failures
    }

    /// Ask every writer for a sink; writers that fail to open contribute none.
    pub async fn open_sinks(&self, exchange: &Exchange) -> (Vec<OpenSink>, Vec<HookError>) {
        let mut sinks = Vec::new();
        let mut failures = Vec::new();
        for writer in &self.writers {
            match writer.open(exchange).await {
                Ok(WriterOutcome::Stream(sink)) => sinks.push(OpenSink::new(writer.name(), sink)),
                Ok(outcome) => debug!(writer = writer.name(), ?outcome, "writer opted out of streaming"),
                Err(error) => {
                    warn!(writer = writer.name(), %error, "writer could not open a sink");
                    failures.push(error);
                }
            }
        }
        (sinks, failures)
    }

    /// Run every logger in order against the finished exchange.
    pub async fn run_loggers(&self, exchange: &Exchange) -> Vec<HookError> {
        let mut failures = Vec::new();
        for logger in &self.loggers {
            if let Err(error) = logger.observe(exchange).await {
                warn!(logger = logger.name(), %error, "logger failed, continuing");
                failures.push(error);
            }
        }
        failures
    }
}

impl std::fmt::Debug for HookPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = |hooks: Vec<&str>| hooks.join(", ");
        f.debug_struct("HookPipeline")
            .field("directors", &names(self.directors.iter().map(|h| h.name()).collect()))
            .field("writers", &names(self.writers.iter().map(|h| h.name()).collect()))
            .field("loggers", &names(self.loggers.iter().map(|h| h.name()).collect()))
            .finish()
    }
}

/// Append-only builder for [`HookPipeline`]
#[derive(Default)]
pub struct PipelineBuilder {
    pipeline: HookPipeline,
}

impl PipelineBuilder {
    pub fn add_director(&mut self, director: impl Director + 'static) -> &mut Self {
        self.pipeline.directors.push(Arc::new(director));
        self
    }

    pub fn add_writer(&mut self, writer: impl Writer + 'static) -> &mut Self {
        self.pipeline.writers.push(Arc::new(writer));
        self
    }

    pub fn add_logger(&mut self, logger: impl Logger + 'static) -> &mut Self {
        self.pipeline.loggers.push(Arc::new(logger));
        self
    }

    pub fn build(self) -> HookPipeline {
        self.pipeline
    }
}

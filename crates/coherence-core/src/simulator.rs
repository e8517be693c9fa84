//! Top-level facade: one engine plus its request history.

use crate::engine::{CoherenceEngine, Engine, Request, RequestOutcome};
use crate::history::{LogEntry, RequestLog};
use crate::snapshot::SystemSnapshot;
use crate::{CoherenceError, ConfigError, SystemConfig};

/// A configured system that records every request it executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Simulator {
    config: SystemConfig,
    engine: Engine,
    history: RequestLog,
    next_sequence: u64,
}

impl Simulator {
    /// Builds a simulator for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `config` does not validate.
    pub fn with_config(config: SystemConfig) -> Result<Self, ConfigError> {
        let engine = Engine::with_config(&config)?;
        log::debug!(
            "{} system with {} nodes ready",
            config.protocol,
            config.node_count
        );
        Ok(Self {
            config,
            engine,
            history: RequestLog::new(config.history_capacity),
            next_sequence: 1,
        })
    }

    /// Configuration the simulator was built with.
    #[must_use]
    pub const fn config(&self) -> &SystemConfig {
        &self.config
    }

    /// Underlying protocol engine.
    #[must_use]
    pub const fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Requests executed since the last reset, newest first.
    #[must_use]
    pub const fn history(&self) -> &RequestLog {
        &self.history
    }

    /// Executes `request` and records it in the history.
    ///
    /// # Errors
    ///
    /// Returns [`CoherenceError::UnknownNode`] when the requester is outside
    /// the system; nothing is recorded in that case.
    pub fn execute(&mut self, request: Request) -> Result<RequestOutcome, CoherenceError> {
        let outcome = self.engine.execute(&request)?;
        let entry = LogEntry {
            sequence: self.next_sequence,
            request,
            outcome: outcome.clone(),
        };
        self.next_sequence += 1;
        self.history.record(entry);
        Ok(outcome)
    }

    /// Flushes and clears the engine, then forgets the history.
    pub fn reset(&mut self) {
        self.engine.reset();
        self.history.clear();
    }

    /// Full read-only view of every node.
    #[must_use]
    pub fn snapshot(&self) -> SystemSnapshot {
        self.engine.snapshot()
    }
}

//! Single-writer control task.
//!
//! In a live deployment telemetry comes from whatever samples the real
//! pool. Rather than share the engine and governor behind a lock, one
//! task owns both and everything else talks to it over channels:
//!
//! ```text
//! sampler ──Telemetry──► mpsc ──► ControlTask ──► watch<KnobValue> ──► pool
//! operator ──Reload────►  │            ▲
//!                         shutdown watch┘
//! ```

use reflex_core::{Decision, FeatureVector, KnobValue};
use reflex_engine::{DecisionEngine, EngineError};
use reflex_format::ReflexModel;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::governor::{GovernorStats, SafetyGovernor, Verdict};

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("control task has stopped")]
    Stopped,

    #[error(transparent)]
    Engine(#[from] EngineError),
}

pub enum ControlCommand {
    /// One telemetry sample; produces at most one applied change.
    Telemetry(FeatureVector),
    /// Swap the engine's model; the result is sent back on `reply`.
    Reload {
        model: ReflexModel,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
}

/// What the task did over its lifetime, returned when it stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlReport {
    pub samples: u64,
    pub anomalies: u64,
    pub governor: GovernorStats,
}

pub struct ControlTask {
    engine: Box<dyn DecisionEngine>,
    governor: SafetyGovernor,
    commands: mpsc::Receiver<ControlCommand>,
    applied: watch::Sender<KnobValue>,
    samples: u64,
}

/// Cloneable sender side of a running control task.
#[derive(Clone)]
pub struct ControlHandle {
    commands: mpsc::Sender<ControlCommand>,
}

impl ControlHandle {
    /// Queue a telemetry sample. Fails only once the task has stopped.
    pub async fn send_telemetry(&self, features: FeatureVector) -> bool {
        self.commands
            .send(ControlCommand::Telemetry(features))
            .await
            .is_ok()
    }

    /// Reload the engine's model and wait for the outcome.
    pub async fn reload(&self, model: ReflexModel) -> Result<(), ControlError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(ControlCommand::Reload { model, reply })
            .await
            .map_err(|_| ControlError::Stopped)?;
        Ok(rx.await.map_err(|_| ControlError::Stopped)??)
    }
}

impl ControlTask {
    /// Create a task plus the handle that feeds it and the receiver that
    /// observes applied values. `initial` is published until the first
    /// decision lands.
    pub fn new(
        engine: Box<dyn DecisionEngine>,
        governor: SafetyGovernor,
        initial: KnobValue,
        capacity: usize,
    ) -> (Self, ControlHandle, watch::Receiver<KnobValue>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (applied, applied_rx) = watch::channel(initial);
        let task = Self {
            engine,
            governor,
            commands: rx,
            applied,
            samples: 0,
        };
        (task, ControlHandle { commands: tx }, applied_rx)
    }

    /// Process commands until shutdown is signalled or every handle is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> ControlReport {
        info!(engine = self.engine.name(), "control task started");

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        Some(command) => self.handle(command),
                        None => {
                            debug!("all control handles dropped");
                            break;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("control task shutting down");
                    break;
                }
            }
        }

        ControlReport {
            samples: self.samples,
            anomalies: self.engine.anomalies(),
            governor: self.governor.stats(),
        }
    }

    fn handle(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::Telemetry(features) => {
                self.samples += 1;
                let proposal = Decision {
                    value: self.engine.decide(&features),
                    tick: features.tick(),
                    at: features.at(),
                };
                let outcome = self.governor.review(proposal, &features);
                if let Verdict::Apply(applied) = outcome.verdict {
                    self.applied.send_replace(applied.value);
                }
            }
            ControlCommand::Reload { model, reply } => {
                let result = self.engine.reload(model);
                if let Err(e) = &result {
                    warn!(error = %e, "model reload rejected");
                }
                let _ = reply.send(result);
            }
        }
    }
}

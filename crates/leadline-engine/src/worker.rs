//! Background worker: consumes triggers handed off by committed writes and
//! runs the periodic due scan.

use tokio::{
  sync::{mpsc, watch},
  task::JoinSet,
  time::{MissedTickBehavior, interval},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use leadline_core::{lead::AgentId, store::LeadStore};

use crate::{Engine, Error, TextUnderstanding, scoring::SequencePolicy};

/// Follow-up work for one lead. Every handler recomputes from stored state,
/// so handling a trigger twice is harmless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
  Rescore { agent: AgentId, lead_id: Uuid },
  Advance { agent: AgentId, lead_id: Uuid },
  /// The lead was reopened; score it and arm a fresh sequence.
  RestartSequence { agent: AgentId, lead_id: Uuid },
}

impl<S: LeadStore, T: TextUnderstanding> Engine<S, T> {
  /// Run one trigger to completion. Failures are logged, never returned.
  pub async fn handle(&self, trigger: Trigger) {
    let result = match &trigger {
      Trigger::Rescore { agent, lead_id } => self.rescore(agent, *lead_id).await.map(drop),
      Trigger::Advance { agent, lead_id } => self.advance_sequence(agent, *lead_id).await.map(drop),
      Trigger::RestartSequence { agent, lead_id } => self
        .rescore_with(agent, *lead_id, SequencePolicy::Restart)
        .await
        .map(drop),
    };

    match result {
      Ok(()) => {}
      // No sequence yet, or it already closed: nothing to do.
      Err(e @ (Error::NotFound { .. } | Error::SequenceState { .. })) => {
        debug!(?trigger, error = %e, "trigger skipped");
      }
      Err(e) => warn!(?trigger, error = %e, "trigger failed"),
    }
  }
}

pub struct Worker<S, T> {
  engine: Engine<S, T>,
  rx:     mpsc::UnboundedReceiver<Trigger>,
}

impl<S: LeadStore, T: TextUnderstanding> Worker<S, T> {
  pub(crate) fn new(engine: Engine<S, T>, rx: mpsc::UnboundedReceiver<Trigger>) -> Self {
    Self { engine, rx }
  }

  /// Handle every queued trigger inline, in order, including any queued while
  /// draining. Returns how many were handled.
  pub async fn drain(&mut self) -> usize {
    let mut handled = 0;
    while let Ok(trigger) = self.rx.try_recv() {
      self.engine.handle(trigger).await;
      handled += 1;
    }
    handled
  }
}

impl<S, T> Worker<S, T>
where
  S: LeadStore + 'static,
  T: TextUnderstanding + 'static,
{
  /// Consume triggers (one task each) and run the due scan until `shutdown`
  /// flips to `true`. Triggers already queued at that point still run, and
  /// every task is awaited before returning.
  pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
    let period = self.engine.config().worker.due_scan_interval();
    let mut scan = interval(period);
    scan.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut tasks = JoinSet::new();

    info!(scan_interval_secs = period.as_secs(), "worker started");

    loop {
      tokio::select! {
        changed = shutdown.changed() => {
          if changed.is_err() || *shutdown.borrow() {
            break;
          }
        }
        Some(trigger) = self.rx.recv() => {
          let engine = self.engine.clone();
          tasks.spawn(async move { engine.handle(trigger).await });
        }
        _ = scan.tick() => {
          let advanced = self.engine.scan_due().await;
          let flushed = self.engine.flush_pending_scores().await;
          if advanced > 0 || flushed > 0 {
            info!(advanced, flushed, "due scan finished");
          }
        }
        Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
          if let Err(e) = joined {
            warn!(error = %e, "trigger task panicked");
          }
        }
      }
    }

    self.rx.close();
    while let Ok(trigger) = self.rx.try_recv() {
      let engine = self.engine.clone();
      tasks.spawn(async move { engine.handle(trigger).await });
    }

    let in_flight = tasks.len();
    while let Some(joined) = tasks.join_next().await {
      if let Err(e) = joined {
        warn!(error = %e, "trigger task panicked");
      }
    }
    info!(in_flight, "worker stopped");
  }
}

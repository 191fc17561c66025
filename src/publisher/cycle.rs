//! Recurring publish cycle with statum state machine
//!
//! One tick moves the cycle through two states:
//!
//! ```text
//! Waiting ──collect_tick──► Publishing(TickBatch) ──fan_out──► Waiting
//! ```
//!
//! `collect_tick` draws one reading per topic in topic order, `fan_out` hands
//! every reading to its own publish task and returns without waiting for
//! them. The loop in [`CycleHandle::spawn`] owns the timer and stops as soon as
//! the handle's cancellation token fires.

use std::sync::Arc;
use std::time::Duration;

use statum::{machine, state};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::controller::submit;
use super::sink::PublishSink;
use crate::mqtt::connector::Connector;
use crate::telemetry::{Reading, ReadingSource};

/// Readings drawn for one tick, in topic order.
#[derive(Debug, Clone)]
pub struct TickBatch {
    pub tick: u64,
    pub readings: Vec<(String, Reading)>,
}

#[state]
#[derive(Debug, Clone)]
pub enum CycleState {
    Waiting,
    Publishing(TickBatch),
}

#[machine]
pub struct PublishCycle<S: CycleState> {
    connector: Arc<dyn Connector>,
    source: Arc<dyn ReadingSource>,
    sink: Arc<dyn PublishSink>,
    topics: Arc<[String]>,
    ticks: u64,
}

impl<S: CycleState> PublishCycle<S> {
    /// Number of ticks collected so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

impl PublishCycle<Waiting> {
    pub fn create(
        connector: Arc<dyn Connector>,
        source: Arc<dyn ReadingSource>,
        sink: Arc<dyn PublishSink>,
        topics: Arc<[String]>,
    ) -> Self {
        Self::new(connector, source, sink, topics, 0)
    }

    pub fn collect_tick(mut self) -> PublishCycle<Publishing> {
        self.ticks += 1;
        let readings: Vec<(String, Reading)> = self
            .topics
            .iter()
            .map(|topic| (topic.clone(), self.source.next_reading()))
            .collect();

        debug!(
            "Tick {}: collected {} readings",
            self.ticks,
            readings.len()
        );
        let batch = TickBatch {
            tick: self.ticks,
            readings,
        };
        self.transition_with(batch)
    }
}

impl PublishCycle<Publishing> {
    /// Spawns one publish task per reading and transitions back to Waiting.
    pub fn fan_out(self) -> PublishCycle<Waiting> {
        match self.get_state_data().cloned() {
            Some(batch) => {
                for (topic, reading) in batch.readings {
                    let connector = self.connector.clone();
                    let sink = self.sink.clone();
                    tokio::spawn(async move {
                        match submit(connector.as_ref(), &topic, &reading).await {
                            Ok(()) => sink.published(&topic, &reading),
                            Err(e) => sink.publish_failed(&topic, &e),
                        }
                    });
                }
            }
            None => warn!("Publishing state without tick batch, skipping tick"),
        }
        self.transition()
    }
}

/// Owner of a running publish cycle.
///
/// Cancelling prevents further ticks; publishes already spawned by a fired
/// tick run to completion. Dropping the handle cancels the cycle.
#[derive(Debug)]
pub struct CycleHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl CycleHandle {
    /// Arms the cycle on `runtime`; the first tick fires one `period` from now.
    pub fn spawn(runtime: &Handle, cycle: PublishCycle<Waiting>, period: Duration) -> Self {
        let token = CancellationToken::new();
        let task = runtime.spawn(run_cycle_loop(cycle, period, token.clone()));
        Self { token, task }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// True once the loop task has exited after cancellation.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for CycleHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn run_cycle_loop(
    mut cycle: PublishCycle<Waiting>,
    period: Duration,
    token: CancellationToken,
) {
    info!("Publish cycle started ({} ms period)", period.as_millis());

    let mut timer = tokio::time::interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = timer.tick() => {}
        }
        // stop() may have raced with the timer on another worker
        if token.is_cancelled() {
            break;
        }

        let publishing = cycle.collect_tick();
        cycle = publishing.fan_out();
    }

    info!("Publish cycle stopped after {} ticks", cycle.ticks());
}

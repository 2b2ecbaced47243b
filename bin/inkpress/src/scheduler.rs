//! Debounced, single-flight rebuild scheduling for watch mode.
//!
//! Change events re-arm a trailing-edge debounce timer while idle. Once the
//! timer fires, one rebuild runs; events arriving during it are folded into a
//! single pending retrigger that starts as soon as the current rebuild ends.

use std::{fmt::Display, future::Future, pin::Pin, time::Duration};

use tokio::{
    sync::mpsc,
    time::{Instant, sleep_until},
};

/// Something the scheduler can rebuild and install.
pub trait Rebuild {
    /// A successful rebuild.
    type Output;

    /// A failed rebuild.
    type Error: Display;

    /// Run one rebuild.
    fn rebuild(&self) -> impl Future<Output = Result<Self::Output, Self::Error>> + Send;

    /// Make a successful rebuild current.
    fn install(&self, output: Self::Output) -> impl Future<Output = ()> + Send;
}

/// Scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No rebuild running. A debounce deadline may be armed.
    Idle,
    /// One rebuild running.
    Building,
    /// One rebuild running and another requested behind it.
    BuildingWithPendingRetrigger,
}

type InFlight<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Drives rebuilds from a stream of change notifications.
#[derive(Debug)]
pub struct WatchScheduler {
    debounce: Duration,
    state: SchedulerState,
    deadline: Option<Instant>,
    build_on_start: bool,
}

impl WatchScheduler {
    /// Create a scheduler with the given quiet period.
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            state: SchedulerState::Idle,
            deadline: None,
            build_on_start: false,
        }
    }

    /// Start a rebuild immediately when [`run`](Self::run) begins.
    pub fn build_on_start(mut self, yes: bool) -> Self {
        self.build_on_start = yes;
        self
    }

    /// Current state.
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Record a change event.
    fn on_change(&mut self) {
        match self.state {
            SchedulerState::Idle => {
                self.deadline = Some(Instant::now() + self.debounce);
            }
            SchedulerState::Building => {
                tracing::debug!("change during rebuild, queueing another");
                self.state = SchedulerState::BuildingWithPendingRetrigger;
            }
            SchedulerState::BuildingWithPendingRetrigger => {}
        }
    }

    /// Run until `shutdown` resolves. A pending deadline and any in-flight
    /// rebuild are dropped on shutdown.
    pub async fn run<R>(
        mut self,
        rebuilder: R,
        mut events: mpsc::Receiver<()>,
        shutdown: impl Future<Output = ()>,
    ) where
        R: Rebuild + Sync,
    {
        tokio::pin!(shutdown);

        let mut in_flight: Option<InFlight<'_, R::Output, R::Error>> = None;
        let mut events_open = true;

        if self.build_on_start {
            self.state = SchedulerState::Building;
            in_flight = Some(Box::pin(rebuilder.rebuild()));
        }

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::debug!(state = ?self.state, "watch scheduler shutting down");
                    break;
                }
                event = events.recv(), if events_open => match event {
                    Some(()) => self.on_change(),
                    None => {
                        tracing::debug!("change channel closed");
                        events_open = false;
                    }
                },
                _ = sleep_until(self.deadline.unwrap_or_else(Instant::now)),
                    if self.deadline.is_some() =>
                {
                    self.deadline = None;
                    self.state = SchedulerState::Building;
                    in_flight = Some(Box::pin(rebuilder.rebuild()));
                }
                result = wait_for(&mut in_flight) => {
                    match result {
                        Ok(output) => rebuilder.install(output).await,
                        Err(e) => {
                            tracing::error!(error = %e, "rebuild failed, keeping previous build");
                        }
                    }

                    if self.state == SchedulerState::BuildingWithPendingRetrigger {
                        self.state = SchedulerState::Building;
                        in_flight = Some(Box::pin(rebuilder.rebuild()));
                    } else {
                        self.state = SchedulerState::Idle;
                        in_flight = None;
                    }
                }
            }
        }
    }
}

async fn wait_for<F: Future + Unpin>(in_flight: &mut Option<F>) -> F::Output {
    match in_flight {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

use serde::Serialize;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SchedulerCadence;
use crate::connection::{ConnectError, Connection, FetchFailure, Resource};
use crate::session::AuthError;
use crate::snapshot::ConnectionStatus;
use crate::store::SnapshotStore;
use crate::transport::{Transport, TransportError};

/// True on every `every`th tick. Tick 0 and a zero cadence never run.
pub fn should_run(tick: u64, every: u64) -> bool {
    every != 0 && tick != 0 && tick % every == 0
}

/// Which of the slower sub-resources a tick refreshes. Status and decoders
/// are refreshed on every tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickPlan {
    pub thumbnails: bool,
    pub streams: bool,
    pub presets: bool,
    pub preview: bool,
    pub choices: bool,
}

impl TickPlan {
    pub fn for_tick(tick: u64, cadence: &SchedulerCadence) -> Self {
        Self {
            thumbnails: should_run(tick, cadence.thumbnails_every),
            streams: should_run(tick, cadence.streams_every),
            presets: should_run(tick, cadence.presets_every),
            preview: should_run(tick, cadence.preview_every),
            choices: should_run(tick, cadence.choices_every),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Connecting,
    Polling { tick: u64 },
    Stopped,
}

#[derive(Debug, Clone)]
pub struct TickReport {
    pub tick: u64,
    pub plan: TickPlan,
    pub failures: Vec<FetchFailure>,
    /// Re-authentication failed and nothing was fetched.
    pub skipped: bool,
}

/// Drives a [`Connection`] through the connect / poll / stop lifecycle.
pub struct PollScheduler<T: Transport> {
    connection: Connection<T>,
    state: SchedulerState,
    tick: u64,
}

impl<T: Transport> PollScheduler<T> {
    pub fn new(connection: Connection<T>) -> Self {
        Self {
            connection,
            state: SchedulerState::Idle,
            tick: 0,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn store(&self) -> &SnapshotStore {
        self.connection.store()
    }

    pub fn connection(&self) -> &Connection<T> {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut Connection<T> {
        &mut self.connection
    }

    pub fn into_connection(self) -> Connection<T> {
        self.connection
    }

    /// Connects and performs the initial refresh. Ends in `Polling` when
    /// polling is enabled, otherwise in `Stopped`.
    pub async fn start(&mut self) -> Result<Vec<FetchFailure>, ConnectError> {
        self.state = SchedulerState::Connecting;
        self.tick = 0;

        let failures = match self.connection.connect().await {
            Ok(failures) => failures,
            Err(err) => {
                warn!(error = %err, "connection failed, not polling");
                self.state = SchedulerState::Stopped;
                return Err(err);
            }
        };

        if self.connection.config().polling {
            self.state = SchedulerState::Polling { tick: 0 };
        } else {
            info!("polling disabled, stopping after initial refresh");
            self.state = SchedulerState::Stopped;
        }
        Ok(failures)
    }

    /// Runs one poll cycle. Every step runs in sequence and a failed step
    /// never aborts the ones after it.
    pub async fn tick(&mut self) -> TickReport {
        self.tick += 1;
        let tick = self.tick;
        self.state = SchedulerState::Polling { tick };
        self.connection.record_tick(tick);

        let plan = TickPlan::for_tick(tick, &self.connection.config().cadence);
        debug!(tick, ?plan, "poll tick");

        if let Err(err) = self.connection.ensure_session().await {
            warn!(tick, error = %err, "re-authentication failed, skipping tick");
            self.connection.set_status(ConnectionStatus::ConnectionFailure(
                "Authentication failed".to_string(),
            ));
            let error = match err {
                AuthError::Rejected(error) => error,
                AuthError::NoSessionCookie => TransportError::AuthRequired,
            };
            return TickReport {
                tick,
                plan,
                failures: vec![FetchFailure::new(Resource::Authentication, error)],
                skipped: true,
            };
        }

        let mut failures = Vec::new();
        failures.extend(self.connection.refresh_system().await.err());
        failures.extend(self.connection.refresh_decoders().await);
        if plan.thumbnails {
            failures.extend(self.connection.refresh_thumbnails().await);
        }
        if plan.streams {
            failures.extend(self.connection.refresh_streams().await.err());
        }
        if plan.presets {
            failures.extend(self.connection.refresh_presets().await.err());
        }
        if plan.preview {
            failures.extend(self.connection.refresh_preview().await.err());
        }
        if plan.choices {
            self.connection.rebuild_choices();
        }

        if !failures.is_empty() {
            debug!(tick, failed = failures.len(), "tick finished with failures");
        }
        TickReport {
            tick,
            plan,
            failures,
            skipped: false,
        }
    }

    /// Polls at the configured interval until `cancel` fires. Cycles never
    /// overlap: a slow cycle delays the next one instead of stacking up.
    /// A cycle in progress when `cancel` fires is dropped mid-flight and never
    /// reported. Whatever it already wrote is discarded by the epoch reset in
    /// [`stop`](Self::stop), which clears the store and rejects writes tagged
    /// with the old epoch.
    pub async fn run<F>(&mut self, cancel: CancellationToken, mut on_tick: F)
    where
        F: FnMut(&TickReport),
    {
        if !matches!(self.state, SchedulerState::Polling { .. }) {
            debug!(state = ?self.state, "not polling, run loop not started");
            return;
        }

        let period = self.connection.config().poll_interval;
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let report = tokio::select! {
                        _ = cancel.cancelled() => break,
                        report = self.tick() => report,
                    };
                    on_tick(&report);
                }
            }
        }

        self.stop();
    }

    /// Tears the connection down: the tick counter resets and the store is
    /// cleared for whatever connects next.
    pub fn stop(&mut self) {
        info!(ticks = self.tick, "poll scheduler stopped");
        self.tick = 0;
        self.state = SchedulerState::Stopped;
        self.connection.disconnect();
    }
}

pub mod api;
pub mod codes;
pub mod commands;
pub mod config;
pub mod connection;
pub mod feedback;
pub mod reconcile;
pub mod scheduler;
pub mod session;
pub mod snapshot;
pub mod store;
pub mod transport;

#[cfg(test)]
mod test_support;

#[cfg(test)]
mod api_tests;
#[cfg(test)]
mod codes_tests;
#[cfg(test)]
mod commands_tests;
#[cfg(test)]
mod config_tests;

pub use commands::{execute, Command, CommandError, CommandOutcome, Refresh, RefreshScope};
pub use config::{ConfigError, ConnectionConfig, SchedulerCadence};
pub use connection::{ConnectError, Connection, FetchFailure, Resource};
pub use reconcile::{Vars, DECODER_COUNT};
pub use scheduler::{should_run, PollScheduler, SchedulerState, TickPlan, TickReport};
pub use session::{AuthError, Credentials, Session};
pub use snapshot::{ConnectionStatus, Snapshot, Thumbnail};
pub use store::{Epoch, SnapshotStore, Update};
pub use transport::{HttpTransport, Method, Transport, TransportError};

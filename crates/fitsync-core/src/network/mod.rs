//! Reachability monitoring
//!
//! Decides whether the API server can be reached right now. The interface
//! flag alone is not trusted: it reflects local link state and can be up
//! while the server, or a hop in between, is unreachable.
//!
//! ## Usage
//!
//! ```ignore
//! let monitor = Arc::new(ReachabilityMonitor::new(config.monitor.clone(), config.backoff, probe, link));
//! let handle = spawn_monitor(monitor.clone());
//! handle.trigger(Trigger::Focus).await;
//! ```

mod dispatcher;
mod link;
mod monitor;
mod probe;
mod status;

pub use dispatcher::{spawn_monitor, MonitorCommand, MonitorHandle, Trigger};
pub use link::{LinkSignal, SharedLink};
pub use monitor::{ReachabilityMonitor, StatusTransition};
pub use probe::{HttpProbe, Probe, ProbeError};
pub use status::{ConnectionQuality, ConnectionType, EffectiveType, LinkInfo, NetworkStatus};

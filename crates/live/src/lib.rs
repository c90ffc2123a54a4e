//! `jobshift-live`: the live dual-run router.
//!
//! A [`MigrationSession`] owns the lifecycle (idle → dual_run →
//! cutover/rolled_back), the routing percentage and the shared counters.
//! [`MigrationProxy`] applies it to each inbound legacy job: pass it through,
//! or translate it and forward it to the target system.

pub mod error;
pub mod forward;
pub mod proxy;
pub mod session;
pub mod translate;

pub use error::{ForwardError, ProxyError, SessionError};
pub use forward::{ForwardResponse, Forwarder, StaticForwarder};
pub use proxy::{HealthReport, MigrationProxy, Route, Routed, DEFAULT_MAX_BODY_BYTES};
pub use session::{MigrationSession, RoutingStats, SessionState, SessionStatus, StatsSnapshot};
pub use translate::Translator;

//! Service Registrations
//!
//! Address-keyed registration records shared by every simulated node, and
//! polling watches that turn changes to them into update/end notifications.

pub mod info;
pub mod store;
pub mod watch;

pub use info::RegistrationInfo;
pub use store::{RegistrationSnapshot, RegistrationStore, StoreStatsSnapshot};
pub use watch::{EndHandler, RegistrationWatch, UpdateHandler, WatchPhase};

//! State machine module.

pub mod handlers;
pub mod machine;

pub use handlers::{AccessState, DeviceInfoState, DumpState, LinkSyncState, StepContext};
pub use machine::{Completion, RetryPolicy, SessionState, Step, truncate_timestamp, unix_timestamp};

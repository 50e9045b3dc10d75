//! Test doubles for steps and jobs.
//!
//! - [`TransactionalStore`]: staging sink and transaction manager with fault
//!   injection and call recording
//! - [`RecordingListener`]: step and job listener that records hook calls

mod recording;
mod store;

pub use recording::RecordingListener;
pub use store::TransactionalStore;

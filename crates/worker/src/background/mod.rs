//! Long-running loops spawned by the worker binary. Each runs until its
//! [`tokio_util::sync::CancellationToken`] is cancelled.

pub mod dispatch;
pub mod refresh;

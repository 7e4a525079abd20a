//! Tokio runtime bindings for `rewardkit-core`: a `reqwest` transport and a
//! timer scheduler built on local tasks.

pub mod http;
pub mod timer;

pub use http::{HttpTransport, DEFAULT_TIMEOUT};
pub use timer::TokioScheduler;

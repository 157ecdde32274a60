/// Console and rolling-file subscriber setup.
pub mod subscriber;

pub use subscriber::{init_tracing, LogOptions};

//! # Pulse Pipeline
//!
//! Drives the observer one finalized pulse at a time:
//!
//! 1. Ask the pulse source for the next pulse (`max(last + 1, should_iterate_from)`)
//! 2. Fetch its records, retrying transient failures
//! 3. Correlate records into entities and fold updates into them
//! 4. Persist the pulse in one transaction, retrying transient failures
//! 5. Advance the cursor and sleep
//!
//! ## Modules
//!
//! - `config`: environment-driven [`ObserverConfig`]
//! - `retry`: fixed-interval [`RetryPolicy`]
//! - `state`: the pulse cursor ([`State`])
//! - `engine`: the [`Observer`] loop

pub mod config;
pub mod engine;
pub mod retry;
pub mod state;

pub use config::{ConfigError, ObserverConfig};
pub use engine::{Observer, PipelineError, StepOutcome};
pub use retry::{RetryError, RetryPolicy, Transient};
pub use state::{State, Stats};

//! Configuration types
//!
//! - `PersistConfig` - Paths, throttle window, cache and prefetch settings
//! - `PersistConfigBuilder` - Fluent builder for `PersistConfig`

mod types;

pub use types::{PersistConfig, PersistConfigBuilder};

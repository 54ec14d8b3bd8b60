//! Host metric sources.
//!
//! Every source implements [`MetricSource`]: one pass over its targets,
//! emitting [`MetricEnvelope`](sysprobe_common::MetricEnvelope)s into a shared
//! bounded channel. A [`Coordinator`] launches all sources concurrently per
//! round and tracks them with a [`CompletionBarrier`]; the consumer drains the
//! channel until the barrier reaches zero.
//!
//! # Sources
//!
//! ```text
//! disk    one envelope per mounted filesystem, dimension mount_point=<path>
//!         total, used, free, in_use
//! mem     one envelope per round, no dimensions
//!         total, available, used, free, pct_used
//! ```

pub mod args;
pub mod barrier;
pub mod config;
pub mod convert;
pub mod disk;
pub mod error;
pub mod logger;
pub mod memory;
pub mod platform;
pub mod round;
pub mod runner;
pub mod sink;
pub mod source;

pub use args::AgentArgs;
pub use barrier::{BarrierGuard, CompletionBarrier};
pub use config::{AgentConfig, ConfigError, DiskConfig, SourcesConfig, SysprobeConfig};
pub use convert::{NamedMetric, Sample, convert_samples, sample};
pub use disk::{DiskProbe, DiskSource, HostDisks, Partition, UsageStat};
pub use error::SourceError;
pub use logger::SourceLogger;
pub use memory::MemorySource;
pub use round::{Coordinator, Round, RoundReport};
pub use runner::{AgentRunner, sources_from_config};
pub use sink::EnvelopeSink;
pub use source::{MetricSource, emit};

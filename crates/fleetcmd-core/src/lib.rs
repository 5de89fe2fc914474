//! fleetcmd-core: Cluster orchestration
//!
//! Runs one command across an ordered list of hosts, in parallel or one
//! host at a time, and collects per-host results in host order.

pub mod cluster;
pub mod config;
pub mod error;

pub use cluster::{ClusterCommand, ClusterMember, ClusterResult, ExecutionMode, Round, RoundReport};
pub use config::{HostConfig, HostFilter, RunPolicy};
pub use error::{ClusterError, CoreError, Phase};

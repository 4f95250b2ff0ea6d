//!
//! # Jobs
//!
//! The job framework every long running operation of the mod manager is built on: downloads,
//! archive installs, file hashing and loadout synchronization all run as jobs.
//!
//! A job is described by a [`JobDefinition`], started through a [`JobMonitor`], and observed
//! through a read only [`JobHandle`]. While running, the definition receives a writer side
//! [`JobContext`] that it uses to report progress and to cooperate with pause and cancel requests.
//! Aside from that, the framework provides:
//! - Cooperative cancellation and pausing at explicit yield points ([`JobContext::yield_now`]);
//! - Force pause for definitions that can handle their cancellation token being tripped mid await;
//! - A strict job lifecycle state machine ([`JobStatus`]);
//! - Multi step progress aggregation with throttled emission ([`CompositeProgress`]);
//! - Job groups sharing one cancellation scope ([`JobGroup`]);
//!
//! ## Basic example
//!
//! ```
//! use modman_jobs::{
//! 	async_trait, JobContext, JobDefinition, JobDefinitionWithStart, JobError, JobMonitor,
//! 	JobStatus, Job,
//! };
//!
//! #[derive(Debug)]
//! pub struct CountJob {
//! 	up_to: u32,
//! }
//!
//! impl JobDefinition for CountJob {}
//!
//! #[async_trait]
//! impl JobDefinitionWithStart for CountJob {
//! 	type Output = u32;
//!
//! 	async fn start(&self, ctx: &JobContext<Self>) -> Result<u32, JobError> {
//! 		for i in 1..=self.up_to {
//! 			ctx.yield_now().await?;
//! 			ctx.set_percent(i, self.up_to);
//! 		}
//!
//! 		Ok(self.up_to)
//! 	}
//! }
//!
//! #[tokio::main]
//! async fn main() {
//! 	let monitor = JobMonitor::new();
//!
//! 	let task = monitor.begin(CountJob { up_to: 10 });
//! 	let job = task.job().clone();
//!
//! 	assert_eq!(task.await.ok(), Some(10));
//! 	assert_eq!(job.status(), JobStatus::Completed);
//! }
//! ```

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(
	clippy::missing_errors_doc,
	clippy::module_name_repetitions,
	clippy::cast_precision_loss
)]

mod context;
mod definition;
mod error;
mod group;
mod job;
mod lock;
mod monitor;
mod percent;
mod progress;
mod status;
mod task;
mod token;

pub use async_trait::async_trait;

pub use context::JobContext;
pub use definition::{JobDefinition, JobDefinitionWithStart};
pub use error::{Error, JobError, OperationCanceled};
pub use group::JobGroup;
pub use job::{Job, JobHandle, JobId};
pub use lock::{ScopedAsyncLock, ScopedLockGuard};
pub use monitor::{JobMonitor, MonitorConfig, MonitorEvent};
pub use percent::{Percent, ProgressUnit};
pub use progress::{CompositeProgress, ProgressUpdater, DEFAULT_PROGRESS_INTERVAL};
pub use status::JobStatus;
pub use task::JobTask;
pub use token::{Cancellable, JobCancellationToken};

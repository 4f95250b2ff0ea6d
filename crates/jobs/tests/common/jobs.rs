use modman_jobs::{
	async_trait, JobContext, JobDefinition, JobDefinitionWithStart, JobError, ProgressUpdater,
};

use std::{
	sync::{
		atomic::{AtomicU32, AtomicUsize, Ordering},
		Arc,
	},
	time::Duration,
};

use tokio::{sync::Notify, time::sleep};
use tracing::info;

#[derive(Debug, thiserror::Error)]
#[error("sample error: {0}")]
pub struct SampleError(pub String);

/// Counts up to `iterations`, reporting progress after each one.
#[derive(Debug)]
pub struct CountJob {
	pub iterations: u32,
	pub step: Duration,
}

impl CountJob {
	pub const fn new(iterations: u32, step: Duration) -> Self {
		Self { iterations, step }
	}
}

impl JobDefinition for CountJob {}

#[async_trait]
impl JobDefinitionWithStart for CountJob {
	type Output = u32;

	async fn start(&self, ctx: &JobContext<Self>) -> Result<u32, JobError> {
		for i in 1..=self.iterations {
			ctx.yield_now().await?;
			sleep(self.step).await;
			ctx.set_percent(i, self.iterations);
		}

		Ok(self.iterations)
	}
}

/// Stops after `pause_after` iterations until `proceed` is notified, so tests can act between
/// two iterations.
#[derive(Debug, Default)]
pub struct CheckpointJob {
	pub iterations: u32,
	pub pause_after: u32,
	pub reached: Arc<Notify>,
	pub proceed: Arc<Notify>,
	pub completed: Arc<AtomicU32>,
}

impl JobDefinition for CheckpointJob {}

#[async_trait]
impl JobDefinitionWithStart for CheckpointJob {
	type Output = u32;

	async fn start(&self, ctx: &JobContext<Self>) -> Result<u32, JobError> {
		for i in 1..=self.iterations {
			ctx.yield_now().await?;

			self.completed.fetch_add(1, Ordering::SeqCst);
			ctx.set_percent(i, self.iterations);

			if i == self.pause_after {
				self.reached.notify_one();
				self.proceed.notified().await;
			}
		}

		Ok(self.completed.load(Ordering::SeqCst))
	}
}

/// Runs until cancelled.
#[derive(Debug)]
pub struct NeverJob {
	pub pausable: bool,
}

impl Default for NeverJob {
	fn default() -> Self {
		Self { pausable: true }
	}
}

impl JobDefinition for NeverJob {
	fn supports_pausing(&self) -> bool {
		self.pausable
	}
}

#[async_trait]
impl JobDefinitionWithStart for NeverJob {
	type Output = ();

	async fn start(&self, ctx: &JobContext<Self>) -> Result<(), JobError> {
		loop {
			ctx.yield_now().await?;
			sleep(Duration::from_millis(5)).await;
		}
	}
}

/// Sleeps through `iterations` steps racing its cancellation token, so a force pause interrupts
/// the step in flight, which is then started over once resumed.
#[derive(Debug)]
pub struct ForcePauseJob {
	pub iterations: u32,
	pub step: Duration,
	pub interruptions: Arc<AtomicUsize>,
}

impl ForcePauseJob {
	pub fn new(iterations: u32, step: Duration) -> Self {
		Self {
			iterations,
			step,
			interruptions: Arc::default(),
		}
	}
}

impl JobDefinition for ForcePauseJob {
	fn supports_force_pause(&self) -> bool {
		true
	}
}

#[async_trait]
impl JobDefinitionWithStart for ForcePauseJob {
	type Output = u32;

	async fn start(&self, ctx: &JobContext<Self>) -> Result<u32, JobError> {
		let mut done = 0;

		while done < self.iterations {
			ctx.yield_now().await?;

			match ctx.run_until_cancelled(sleep(self.step)).await {
				Ok(()) => {
					done += 1;
					ctx.set_percent(done, self.iterations);
				}
				Err(e) => {
					info!("ForcePauseJob interrupted at step {done}");
					self.interruptions.fetch_add(1, Ordering::SeqCst);
					ctx.handle_pause_error(e).await?;
				}
			}
		}

		Ok(done)
	}
}

#[derive(Debug)]
pub struct FailingJob;

impl JobDefinition for FailingJob {}

#[async_trait]
impl JobDefinitionWithStart for FailingJob {
	type Output = ();

	async fn start(&self, ctx: &JobContext<Self>) -> Result<(), JobError> {
		ctx.yield_now().await?;

		Err(JobError::failed(SampleError("disk on fire".to_string())))
	}
}

#[derive(Debug)]
pub struct SelfCancelJob;

impl JobDefinition for SelfCancelJob {}

#[async_trait]
impl JobDefinitionWithStart for SelfCancelJob {
	type Output = ();

	async fn start(&self, ctx: &JobContext<Self>) -> Result<(), JobError> {
		ctx.yield_now().await?;

		ctx.cancel_and_throw("nothing left to do")
	}
}

#[derive(Debug)]
pub struct PanicJob;

impl JobDefinition for PanicJob {}

#[async_trait]
impl JobDefinitionWithStart for PanicJob {
	type Output = ();

	async fn start(&self, ctx: &JobContext<Self>) -> Result<(), JobError> {
		ctx.yield_now().await?;

		panic!("job exploded");
	}
}

/// Reports its progress through a [`modman_jobs::CompositeProgress`] of `steps` steps.
#[derive(Debug)]
pub struct StepsJob {
	pub steps: usize,
}

impl JobDefinition for StepsJob {}

#[async_trait]
impl JobDefinitionWithStart for StepsJob {
	type Output = usize;

	async fn start(&self, ctx: &JobContext<Self>) -> Result<usize, JobError> {
		let progress = ctx.composite_progress(self.steps);

		for _ in 0..self.steps {
			ctx.yield_now().await?;

			for quarter in 1..4 {
				progress.set_step_progress(f64::from(quarter) / 4.0);
			}

			progress.next_step();
		}

		Ok(progress.completed_steps())
	}
}

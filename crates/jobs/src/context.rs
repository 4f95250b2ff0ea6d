use std::{borrow::Cow, fmt, future::Future, sync::Arc};

use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::{
	definition::JobDefinition,
	error::{JobError, OperationCanceled},
	job::{sealed, Job, JobHandle, JobState},
	percent::{Percent, ProgressUnit},
	progress::CompositeProgress,
	token::{Cancellable, JobCancellationToken},
};

/// The writer side of a job, only handed to the definition that runs it.
///
/// It is also a [`Job`], so everything it writes can be read back from it.
pub struct JobContext<D> {
	state: Arc<JobState>,
	definition: Arc<D>,
}

impl<D> Clone for JobContext<D> {
	fn clone(&self) -> Self {
		Self {
			state: Arc::clone(&self.state),
			definition: Arc::clone(&self.definition),
		}
	}
}

impl<D: JobDefinition> sealed::Sealed for JobContext<D> {
	fn state(&self) -> &JobState {
		&self.state
	}
}

impl<D: JobDefinition> Job for JobContext<D> {}

impl<D: JobDefinition> fmt::Debug for JobContext<D> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("JobContext")
			.field("state", &self.state)
			.finish_non_exhaustive()
	}
}

impl<D: JobDefinition> JobContext<D> {
	pub(crate) const fn new(state: Arc<JobState>, definition: Arc<D>) -> Self {
		Self { state, definition }
	}

	/// The concrete definition this job is running.
	#[must_use]
	pub fn definition(&self) -> &D {
		&self.definition
	}

	/// A read only handle to this same job.
	#[must_use]
	pub fn handle(&self) -> JobHandle {
		JobHandle::new(Arc::clone(&self.state))
	}

	#[must_use]
	pub fn cancellation_token(&self) -> &JobCancellationToken {
		self.state.token()
	}

	/// The current cancellation source of the job, see [`JobCancellationToken::token`].
	#[must_use]
	pub fn token(&self) -> CancellationToken {
		self.state.token().token()
	}

	pub fn set_progress(&self, progress: Percent) {
		self.state.set_progress(Some(progress));
	}

	/// Reports `current` out of `maximum` units of work as the job progress.
	pub fn set_percent<T: ProgressUnit>(&self, current: T, maximum: T) {
		self.set_progress(Percent::create(current, maximum));
	}

	pub fn set_rate_of_progress(&self, rate: f64) {
		self.state.set_rate_of_progress(Some(rate));
	}

	/// The cooperation point of a job: returns an error if the job got cancelled, waits here while
	/// the job is paused, and otherwise just yields to the scheduler.
	pub async fn yield_now(&self) -> Result<(), OperationCanceled> {
		let token = self.state.token();

		loop {
			token.wait_for_resume().await?;

			match token.throw_if_cancellation_requested() {
				Ok(()) => break,
				// Force paused between the two checks, go back to waiting
				Err(e) if token.is_pausing_cancellation(&e) => continue,
				Err(e) => return Err(e),
			}
		}

		tokio::task::yield_now().await;

		Ok(())
	}

	/// Cancels the job from within and returns the cancellation error to bubble up with.
	///
	/// It always returns `Err`, so it reads as `return ctx.cancel_and_throw("reason");`.
	pub fn cancel_and_throw<T>(&self, message: impl Into<Cow<'static, str>>) -> Result<T, JobError> {
		self.state.cancel();

		let canceled = self
			.state
			.token()
			.throw_if_cancellation_requested()
			.err()
			.unwrap_or_else(OperationCanceled::detached);

		Err(canceled.with_message(message).into())
	}

	/// Absorbs a cancellation error caused by a force pause, waiting for the job to be resumed.
	///
	/// Any other error is given back, so definitions can do
	/// `ctx.handle_pause_error(e).await?` and then retry what got interrupted.
	pub async fn handle_pause_error(&self, err: impl Into<JobError> + Send) -> Result<(), JobError> {
		let err = err.into();
		let token = self.state.token();

		if let JobError::Canceled(canceled) = &err {
			if token.is_pausing_cancellation(canceled) {
				trace!(job_id = %self.state.id(), "Job force paused, waiting to be resumed");
				token.wait_for_resume().await?;
				return Ok(());
			}

			if token.is_resumed_pause_cancellation(canceled) {
				return Ok(());
			}
		}

		Err(err)
	}

	/// Races `fut` against the job's current cancellation source.
	pub fn run_until_cancelled<F: Future>(&self, fut: F) -> Cancellable<F> {
		self.state.token().run_until_cancelled(fut)
	}

	/// A [`CompositeProgress`] of `steps` steps reporting straight into this job's progress.
	#[must_use]
	pub fn composite_progress(&self, steps: usize) -> CompositeProgress {
		let state = Arc::clone(&self.state);

		CompositeProgress::new(steps, move |percent| state.set_progress(Some(percent)))
	}
}

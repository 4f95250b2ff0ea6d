use std::{fmt, sync::Arc};

use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{error, trace, warn};
use uuid::Uuid;

use super::{
	definition::JobDefinition,
	error::{Error, JobError},
	group::JobGroup,
	lock::ScopedAsyncLock,
	percent::Percent,
	status::JobStatus,
	token::JobCancellationToken,
};

/// A unique identifier for a job using the [`uuid`](https://docs.rs/uuid) crate.
pub type JobId = Uuid;

pub(crate) mod sealed {
	pub trait Sealed {
		fn state(&self) -> &super::JobState;
	}
}

/// The read only view of a job, safe to hand to any observer.
///
/// The writer side is the [`JobContext`](crate::JobContext) given to the running definition;
/// both are views over the same job, so every change made through the context is visible here.
pub trait Job: sealed::Sealed + Send + Sync {
	fn id(&self) -> JobId {
		self.state().id
	}

	fn status(&self) -> JobStatus {
		*self.state().status.borrow()
	}

	fn progress(&self) -> Option<Percent> {
		*self.state().progress.borrow()
	}

	/// Units of work per second, for jobs that know how fast they go but not how far.
	fn rate_of_progress(&self) -> Option<f64> {
		*self.state().rate_of_progress.borrow()
	}

	fn group(&self) -> &Arc<JobGroup> {
		&self.state().group
	}

	fn definition(&self) -> &dyn JobDefinition {
		&*self.state().definition
	}

	fn watch_status(&self) -> watch::Receiver<JobStatus> {
		self.state().status.subscribe()
	}

	fn watch_progress(&self) -> watch::Receiver<Option<Percent>> {
		self.state().progress.subscribe()
	}

	fn watch_rate_of_progress(&self) -> watch::Receiver<Option<f64>> {
		self.state().rate_of_progress.subscribe()
	}

	fn status_stream(&self) -> WatchStream<JobStatus> {
		WatchStream::new(self.watch_status())
	}

	fn progress_stream(&self) -> WatchStream<Option<Percent>> {
		WatchStream::new(self.watch_progress())
	}

	fn rate_of_progress_stream(&self) -> WatchStream<Option<f64>> {
		WatchStream::new(self.watch_rate_of_progress())
	}

	fn can_be_cancelled(&self) -> bool {
		self.status().is_active()
	}

	fn can_be_paused(&self) -> bool {
		self.status() == JobStatus::Running && self.definition().supports_pausing()
	}
}

/// Shared state of a single job, both [`JobHandle`] and [`JobContext`](crate::JobContext)
/// point to it.
pub struct JobState {
	id: JobId,
	definition: Arc<dyn JobDefinition>,
	group: Arc<JobGroup>,
	token: JobCancellationToken,
	status: watch::Sender<JobStatus>,
	progress: watch::Sender<Option<Percent>>,
	rate_of_progress: watch::Sender<Option<f64>>,
	outcome: watch::Sender<Option<Result<(), JobError>>>,
	control_lock: ScopedAsyncLock,
}

impl fmt::Debug for JobState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("JobState")
			.field("id", &self.id)
			.field("definition", &self.definition)
			.field("status", &*self.status.borrow())
			.field("progress", &*self.progress.borrow())
			.field("token", &self.token)
			.finish_non_exhaustive()
	}
}

impl JobState {
	pub(crate) fn new(definition: Arc<dyn JobDefinition>, group: Arc<JobGroup>) -> Self {
		let token = JobCancellationToken::linked(group.token(), definition.supports_force_pause());

		Self {
			id: JobId::new_v4(),
			definition,
			group,
			token,
			status: watch::Sender::new(JobStatus::Created),
			progress: watch::Sender::new(None),
			rate_of_progress: watch::Sender::new(None),
			outcome: watch::Sender::new(None),
			control_lock: ScopedAsyncLock::new(),
		}
	}

	pub(crate) const fn id(&self) -> JobId {
		self.id
	}

	pub(crate) const fn token(&self) -> &JobCancellationToken {
		&self.token
	}

	pub(crate) fn definition_name(&self) -> &'static str {
		self.definition.name()
	}

	pub(crate) fn status(&self) -> JobStatus {
		*self.status.borrow()
	}

	/// Moves the job to `next`, rejecting any transition the lifecycle doesn't allow.
	pub(crate) fn transition(&self, next: JobStatus) -> Result<JobStatus, Error> {
		let mut res = Ok(JobStatus::None);

		self.status.send_if_modified(|current| {
			if current.can_transition_to(next) {
				res = Ok(*current);
				*current = next;
				true
			} else {
				res = Err(Error::IllegalTransition {
					id: self.id,
					from: *current,
					to: next,
				});
				false
			}
		});

		match &res {
			Ok(previous) => trace!(job_id = %self.id, %previous, %next, "Job status changed"),
			Err(e) => error!(job_id = %self.id, ?e, "Rejected job status change"),
		}

		res
	}

	/// Compare and set version of [`transition`](Self::transition), only moving away from
	/// `expected`.
	pub(crate) fn try_transition(&self, expected: JobStatus, next: JobStatus) -> bool {
		self.status.send_if_modified(|current| {
			if *current == expected && current.can_transition_to(next) {
				*current = next;
				true
			} else {
				false
			}
		})
	}

	pub(crate) fn set_progress(&self, progress: Option<Percent>) {
		self.progress.send_replace(progress);
	}

	pub(crate) fn set_rate_of_progress(&self, rate: Option<f64>) {
		self.rate_of_progress.send_replace(rate);
	}

	/// Stores the final status and outcome of the job, waking up everyone waiting on it.
	pub(crate) fn finish(&self, status: JobStatus, outcome: Result<(), JobError>) {
		debug_assert!(status.is_terminal());

		// Rejections are already logged, the outcome must be delivered regardless
		let _ = self.transition(status);

		self.outcome.send_replace(Some(outcome));
	}

	pub(crate) fn cancel(&self) {
		trace!(job_id = %self.id, "Cancelling job");
		self.token.cancel();
	}

	pub(crate) async fn pause(&self) {
		let _guard = self.control_lock.lock().await;

		if self.status() != JobStatus::Running || self.token.is_cancelled() {
			trace!(job_id = %self.id, status = %self.status(), "Job isn't running, will not pause");
			return;
		}

		if !self.definition.supports_pausing() {
			warn!(
				job_id = %self.id,
				job = self.definition.name(),
				"Job doesn't support pausing, cancelling it instead"
			);
			self.token.cancel();
			return;
		}

		if self.try_transition(JobStatus::Running, JobStatus::Paused) {
			self.token.pause();
		}
	}

	pub(crate) async fn resume(&self) {
		let _guard = self.control_lock.lock().await;

		if self.token.is_cancelled() {
			trace!(job_id = %self.id, "Job was cancelled, will not resume");
			return;
		}

		if self.try_transition(JobStatus::Paused, JobStatus::Running) {
			self.token.resume();
		} else {
			trace!(job_id = %self.id, status = %self.status(), "Job isn't paused, will not resume");
		}
	}
}

/// A cheap to clone handle to a job, used to observe it and wait for it.
#[derive(Clone)]
pub struct JobHandle {
	state: Arc<JobState>,
}

impl sealed::Sealed for JobHandle {
	fn state(&self) -> &JobState {
		&self.state
	}
}

impl Job for JobHandle {}

impl fmt::Debug for JobHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("JobHandle")
			.field("id", &self.state.id)
			.field("job", &self.state.definition_name())
			.field("status", &self.state.status())
			.finish()
	}
}

impl JobHandle {
	pub(crate) const fn new(state: Arc<JobState>) -> Self {
		Self { state }
	}

	/// Reaches the control side of the job, only the monitor and groups are allowed to.
	pub(crate) const fn as_context(&self) -> &Arc<JobState> {
		&self.state
	}

	/// Waits until the job reaches a terminal status.
	///
	/// Resolves to the cancellation error if the job was cancelled, and to the original error if
	/// it failed.
	pub async fn wait(&self) -> Result<(), JobError> {
		let mut outcome_rx = self.state.outcome.subscribe();

		let outcome = match outcome_rx.wait_for(Option::is_some).await {
			Ok(outcome) => outcome.clone().unwrap_or(Ok(())),
			// We hold the sender through `self.state`, so the channel can't be closed
			Err(_) => unreachable!("job outcome channel closed while its sender is alive"),
		};

		outcome
	}

	/// The error the job failed or got cancelled with, if it did.
	#[must_use]
	pub fn try_error(&self) -> Option<JobError> {
		self.state
			.outcome
			.borrow()
			.as_ref()
			.and_then(|outcome| outcome.clone().err())
	}

	#[must_use]
	pub fn is_finished(&self) -> bool {
		self.state.outcome.borrow().is_some()
	}
}

#[cfg(test)]
mod tests {
	use crate::error::OperationCanceled;

	use super::*;

	#[derive(Debug)]
	struct Noop;

	impl JobDefinition for Noop {}

	fn new_job() -> JobHandle {
		JobHandle::new(Arc::new(JobState::new(
			Arc::new(Noop),
			Arc::new(JobGroup::new()),
		)))
	}

	#[test]
	fn starts_created_without_progress() {
		let job = new_job();

		assert_eq!(job.status(), JobStatus::Created);
		assert_eq!(job.progress(), None);
		assert_eq!(job.rate_of_progress(), None);
		assert!(job.definition().is::<Noop>());
		assert!(!job.can_be_cancelled());
		assert!(!job.can_be_paused());
		assert!(!job.is_finished());
	}

	#[test]
	fn illegal_transitions_are_rejected() {
		let job = new_job();
		let state = job.as_context();

		assert!(matches!(
			state.transition(JobStatus::Completed),
			Err(Error::IllegalTransition {
				from: JobStatus::Created,
				to: JobStatus::Completed,
				..
			})
		));
		assert_eq!(job.status(), JobStatus::Created);

		assert_eq!(state.transition(JobStatus::Running).unwrap(), JobStatus::Created);
		assert!(!state.try_transition(JobStatus::Paused, JobStatus::Running));
		assert!(state.try_transition(JobStatus::Running, JobStatus::Paused));
		assert_eq!(job.status(), JobStatus::Paused);
	}

	#[tokio::test]
	async fn pause_and_resume_only_apply_to_the_right_status() {
		let job = new_job();
		let state = job.as_context();

		state.pause().await;
		assert_eq!(job.status(), JobStatus::Created);
		assert!(!state.token().is_paused());

		state.transition(JobStatus::Running).unwrap();
		state.resume().await;
		assert_eq!(job.status(), JobStatus::Running);

		state.pause().await;
		assert_eq!(job.status(), JobStatus::Paused);
		assert!(state.token().is_paused());

		state.resume().await;
		assert_eq!(job.status(), JobStatus::Running);
		assert!(!state.token().is_paused());
	}

	#[tokio::test]
	async fn cancelled_group_keeps_paused_job_from_resuming() {
		let job = new_job();
		let state = job.as_context();

		state.transition(JobStatus::Running).unwrap();
		state.pause().await;
		assert_eq!(job.status(), JobStatus::Paused);

		job.group().cancel();
		state.resume().await;

		assert_eq!(job.status(), JobStatus::Paused);
		assert!(state.token().is_cancelled());
		assert!(!state.token().is_paused());
	}

	#[tokio::test]
	async fn waiters_get_the_outcome() {
		let job = new_job();
		let state = Arc::clone(job.as_context());

		let waiter = tokio::spawn({
			let job = job.clone();
			async move { job.wait().await }
		});

		state.transition(JobStatus::Running).unwrap();
		state.finish(
			JobStatus::Cancelled,
			Err(JobError::from(OperationCanceled::detached())),
		);

		assert!(waiter.await.unwrap().unwrap_err().is_canceled());
		assert!(job.is_finished());
		assert!(job.try_error().is_some_and(|e| e.is_canceled()));
	}
}

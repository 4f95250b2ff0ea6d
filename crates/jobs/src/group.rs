use std::{
	fmt,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc, Weak,
	},
};

use futures_concurrency::future::Join;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::job::{JobHandle, JobState};

/// Jobs sharing a cancellation scope.
///
/// Every job belongs to exactly one group, and every job's cancellation token is linked to the
/// group's scope, so cancelling the group cancels all of them at once. The group only keeps weak
/// references to its jobs, it lives for as long as any of them does.
pub struct JobGroup {
	token: CancellationToken,
	cancelled: AtomicBool,
	jobs: Mutex<Vec<Weak<JobState>>>,
}

impl fmt::Debug for JobGroup {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("JobGroup")
			.field("cancelled", &self.is_cancelled())
			.field("jobs", &self.len())
			.finish()
	}
}

impl Default for JobGroup {
	fn default() -> Self {
		Self::new()
	}
}

impl JobGroup {
	#[must_use]
	pub fn new() -> Self {
		Self {
			token: CancellationToken::new(),
			cancelled: AtomicBool::new(false),
			jobs: Mutex::new(Vec::new()),
		}
	}

	/// The scope every job token of this group is linked to.
	pub(crate) const fn token(&self) -> &CancellationToken {
		&self.token
	}

	/// Adds a job to the group. Jobs attached to an already cancelled group are cancelled right
	/// away.
	pub fn attach(&self, job: &JobHandle) {
		let state = job.as_context();

		{
			let mut jobs = self.jobs.lock();
			jobs.retain(|job| job.strong_count() > 0);
			jobs.push(Arc::downgrade(state));
		}

		if self.is_cancelled() {
			trace!(job_id = %state.id(), "Attached job to a cancelled group");
			state.cancel();
		}
	}

	/// Cancels every job in the group, including the ones that are paused.
	pub fn cancel(&self) {
		if self.cancelled.swap(true, Ordering::AcqRel) {
			return;
		}

		self.token.cancel();

		for job in self.live_jobs() {
			job.cancel();
		}

		trace!("Job group cancelled");
	}

	#[must_use]
	pub fn is_cancelled(&self) -> bool {
		self.cancelled.load(Ordering::Acquire)
	}

	/// Pauses every running job in the group.
	pub async fn pause(&self) {
		self.live_jobs()
			.iter()
			.map(|job| job.pause())
			.collect::<Vec<_>>()
			.join()
			.await;
	}

	/// Resumes every paused job in the group.
	pub async fn resume(&self) {
		self.live_jobs()
			.iter()
			.map(|job| job.resume())
			.collect::<Vec<_>>()
			.join()
			.await;
	}

	/// Number of attached jobs still alive.
	#[must_use]
	pub fn len(&self) -> usize {
		self.jobs
			.lock()
			.iter()
			.filter(|job| job.strong_count() > 0)
			.count()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Handles of every attached job still alive, in attachment order.
	#[must_use]
	pub fn jobs(&self) -> Vec<JobHandle> {
		self.live_jobs().into_iter().map(JobHandle::new).collect()
	}

	fn live_jobs(&self) -> Vec<Arc<JobState>> {
		self.jobs.lock().iter().filter_map(Weak::upgrade).collect()
	}
}

#[cfg(test)]
mod tests {
	use crate::{definition::JobDefinition, job::Job};

	use super::*;

	#[derive(Debug)]
	struct Noop;

	impl JobDefinition for Noop {}

	fn attached_job(group: &Arc<JobGroup>) -> JobHandle {
		let job = JobHandle::new(Arc::new(JobState::new(Arc::new(Noop), Arc::clone(group))));
		group.attach(&job);
		job
	}

	#[test]
	fn only_keeps_live_jobs() {
		let group = Arc::new(JobGroup::new());
		assert!(group.is_empty());

		let first = attached_job(&group);
		let second = attached_job(&group);
		assert_eq!(group.len(), 2);

		drop(second);
		assert_eq!(group.len(), 1);
		assert_eq!(group.jobs()[0].id(), first.id());
	}

	#[test]
	fn cancel_reaches_every_job_token() {
		let group = Arc::new(JobGroup::new());
		let jobs = (0..3).map(|_| attached_job(&group)).collect::<Vec<_>>();

		group.cancel();

		assert!(group.is_cancelled());
		for job in &jobs {
			assert!(job.as_context().token().is_cancelled());
			assert!(job.as_context().token().token().is_cancelled());
		}

		let late = attached_job(&group);
		assert!(late.as_context().token().is_cancelled());
	}
}

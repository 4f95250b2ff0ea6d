use std::{any::Any, collections::HashMap, future::Future, panic::AssertUnwindSafe, sync::Arc};

use futures::FutureExt;
use futures_concurrency::future::Join;
use parking_lot::RwLock;
use tokio::{
	spawn,
	sync::{broadcast, oneshot},
};
use tracing::{debug, error, info_span, instrument, trace, warn, Instrument};

use super::{
	context::JobContext,
	definition::{JobDefinition, JobDefinitionWithStart},
	error::{Error, JobError, OperationCanceled},
	group::JobGroup,
	job::{Job, JobHandle, JobId, JobState},
	status::JobStatus,
	task::JobTask,
};

#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
	/// Keep jobs around after they finish, instead of dropping them from the monitor.
	pub retain_finished_jobs: bool,
	/// How many [`MonitorEvent`]s a lagging subscriber can fall behind before missing some.
	pub event_capacity: usize,
}

impl Default for MonitorConfig {
	fn default() -> Self {
		Self {
			retain_finished_jobs: false,
			event_capacity: 64,
		}
	}
}

#[derive(Debug, Clone)]
pub enum MonitorEvent {
	Added(JobHandle),
	Removed(JobId),
}

struct Inner {
	config: MonitorConfig,
	jobs: RwLock<HashMap<JobId, JobHandle>>,
	events_tx: broadcast::Sender<MonitorEvent>,
}

impl Inner {
	fn add(&self, job: JobHandle) {
		self.jobs.write().insert(job.id(), job.clone());

		// No subscribers is fine
		let _ = self.events_tx.send(MonitorEvent::Added(job));
	}

	fn remove(&self, id: JobId) {
		if self.config.retain_finished_jobs {
			return;
		}

		if self.jobs.write().remove(&id).is_some() {
			let _ = self.events_tx.send(MonitorEvent::Removed(id));
		}
	}
}

/// Starts jobs and keeps track of the live ones.
///
/// Cheap to clone, every clone sees the same set of jobs. Pause, resume and cancel requests for
/// a single job are serialized, so they can be issued from anywhere concurrently.
#[derive(Clone)]
pub struct JobMonitor {
	inner: Arc<Inner>,
}

impl Default for JobMonitor {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Debug for JobMonitor {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("JobMonitor")
			.field("config", &self.inner.config)
			.field("jobs", &self.inner.jobs.read().len())
			.finish()
	}
}

impl JobMonitor {
	#[must_use]
	pub fn new() -> Self {
		Self::with_config(MonitorConfig::default())
	}

	#[must_use]
	pub fn with_config(config: MonitorConfig) -> Self {
		let (events_tx, _) = broadcast::channel(config.event_capacity.max(1));

		Self {
			inner: Arc::new(Inner {
				config,
				jobs: RwLock::new(HashMap::new()),
				events_tx,
			}),
		}
	}

	/// Starts `definition` as a job in its own new group.
	///
	/// # Panics
	///
	/// Panics if called outside of a Tokio runtime.
	pub fn begin<D: JobDefinitionWithStart>(&self, definition: D) -> JobTask<D, D::Output> {
		self.begin_in_group(definition, &Arc::new(JobGroup::new()))
	}

	/// Starts `definition` as a job in `group`, sharing its cancellation scope.
	///
	/// # Panics
	///
	/// Panics if called outside of a Tokio runtime.
	pub fn begin_in_group<D: JobDefinitionWithStart>(
		&self,
		definition: D,
		group: &Arc<JobGroup>,
	) -> JobTask<D, D::Output> {
		self.launch(Arc::new(definition), group, |ctx| async move {
			ctx.definition().start(&ctx).await
		})
	}

	/// Starts `definition` as a job, running `run` instead of a
	/// [`JobDefinitionWithStart::start`].
	///
	/// # Panics
	///
	/// Panics if called outside of a Tokio runtime.
	pub fn begin_with<D, T, F, Fut>(&self, definition: D, run: F) -> JobTask<D, T>
	where
		D: JobDefinition,
		T: Send + 'static,
		F: FnOnce(JobContext<D>) -> Fut,
		Fut: Future<Output = Result<T, JobError>> + Send + 'static,
	{
		self.launch(Arc::new(definition), &Arc::new(JobGroup::new()), run)
	}

	fn launch<D, T, F, Fut>(&self, definition: Arc<D>, group: &Arc<JobGroup>, run: F) -> JobTask<D, T>
	where
		D: JobDefinition,
		T: Send + 'static,
		F: FnOnce(JobContext<D>) -> Fut,
		Fut: Future<Output = Result<T, JobError>> + Send + 'static,
	{
		let erased: Arc<dyn JobDefinition> = definition.clone();
		let state = Arc::new(JobState::new(erased, Arc::clone(group)));
		let job = JobHandle::new(Arc::clone(&state));
		let id = job.id();

		group.attach(&job);
		self.inner.add(job.clone());

		debug!(job_id = %id, job = definition.name(), "Starting job");

		let (result_tx, result_rx) = oneshot::channel();
		let job_fut = run(JobContext::new(Arc::clone(&state), Arc::clone(&definition)));

		spawn({
			let inner = Arc::clone(&self.inner);
			let span = info_span!("job", job_id = %id, job = definition.name());

			async move {
				run_job(&state, job_fut, result_tx).await;
				inner.remove(id);
			}
			.instrument(span)
		});

		JobTask::new(job, definition, result_rx)
	}

	#[must_use]
	pub fn find(&self, id: JobId) -> Option<JobHandle> {
		self.inner.jobs.read().get(&id).cloned()
	}

	#[must_use]
	pub fn jobs(&self) -> Vec<JobHandle> {
		self.inner.jobs.read().values().cloned().collect()
	}

	/// Every job whose definition is a `D`.
	#[must_use]
	pub fn jobs_of<D: JobDefinition>(&self) -> Vec<JobHandle> {
		self.inner
			.jobs
			.read()
			.values()
			.filter(|job| job.definition().is::<D>())
			.cloned()
			.collect()
	}

	/// Notifications of jobs being added to and removed from the monitor.
	#[must_use]
	pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
		self.inner.events_tx.subscribe()
	}

	fn get(&self, id: JobId) -> Result<JobHandle, Error> {
		self.find(id).ok_or(Error::NotFound(id))
	}

	/// Pauses a running job. Jobs that don't support pausing are cancelled instead.
	#[instrument(skip_all, fields(job_id = %id), err)]
	pub async fn pause(&self, id: JobId) -> Result<(), Error> {
		self.get(id)?.as_context().pause().await;
		Ok(())
	}

	#[instrument(skip_all, fields(job_id = %id), err)]
	pub async fn resume(&self, id: JobId) -> Result<(), Error> {
		self.get(id)?.as_context().resume().await;
		Ok(())
	}

	#[instrument(skip_all, fields(job_id = %id), err)]
	pub async fn cancel(&self, id: JobId) -> Result<(), Error> {
		self.get(id)?.as_context().cancel();
		Ok(())
	}

	pub async fn pause_group(&self, group: &JobGroup) {
		group.pause().await;
	}

	pub async fn resume_group(&self, group: &JobGroup) {
		group.resume().await;
	}

	pub fn cancel_group(&self, group: &JobGroup) {
		group.cancel();
	}

	pub async fn pause_all(&self) {
		let jobs = self.jobs();
		trace!(count = jobs.len(), "Pausing all jobs");

		jobs.iter()
			.map(|job| job.as_context().pause())
			.collect::<Vec<_>>()
			.join()
			.await;
	}

	pub async fn resume_all(&self) {
		let jobs = self.jobs();
		trace!(count = jobs.len(), "Resuming all jobs");

		jobs.iter()
			.map(|job| job.as_context().resume())
			.collect::<Vec<_>>()
			.join()
			.await;
	}

	pub fn cancel_all(&self) {
		for job in self.jobs() {
			job.as_context().cancel();
		}
	}
}

async fn run_job<T>(
	state: &JobState,
	job_fut: impl Future<Output = Result<T, JobError>>,
	result_tx: oneshot::Sender<Result<T, JobError>>,
) {
	if state.token().is_cancelled() {
		trace!("Job cancelled before it started");

		let err = JobError::from(
			state
				.token()
				.throw_if_cancellation_requested()
				.err()
				.unwrap_or_else(OperationCanceled::detached),
		);

		state.finish(JobStatus::Cancelled, Err(err.clone()));
		let _ = result_tx.send(Err(err));
		return;
	}

	if let Err(e) = state.transition(JobStatus::Running) {
		let err = JobError::failed(e);
		state.finish(JobStatus::Failed, Err(err.clone()));
		let _ = result_tx.send(Err(err));
		return;
	}

	let res = AssertUnwindSafe(job_fut)
		.catch_unwind()
		.await
		.unwrap_or_else(|panic| Err(JobError::Panicked(panic_message(&*panic))));

	let (status, outcome) = match &res {
		Ok(_) => {
			debug!("Job completed");
			(JobStatus::Completed, Ok(()))
		}

		Err(e @ JobError::Canceled(_)) if state.token().is_cancelled() => {
			debug!("Job cancelled");
			(JobStatus::Cancelled, Err(e.clone()))
		}

		Err(e) => {
			if e.is_canceled() {
				warn!("Job returned a cancellation error without being cancelled");
			}
			error!(job = state.definition_name(), ?e, "Job failed");
			(JobStatus::Failed, Err(e.clone()))
		}
	};

	state.finish(status, outcome);

	if result_tx.send(res).is_err() {
		trace!("JobTask dropped, nobody is waiting for the result");
	}
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
	panic
		.downcast_ref::<&str>()
		.map(ToString::to_string)
		.or_else(|| panic.downcast_ref::<String>().cloned())
		.unwrap_or_else(|| "unknown panic payload".to_string())
}

use std::{
	fmt,
	future::Future,
	pin::Pin,
	sync::Arc,
	task::{Context, Poll},
};

use tokio::sync::oneshot::{self, error::TryRecvError};

use super::{
	definition::JobDefinition,
	error::{Error, JobError, OperationCanceled},
	job::{Job, JobHandle},
};

/// A started job together with its typed result.
///
/// Awaiting it resolves to the value returned by the definition, or to the error the job failed
/// or got cancelled with. If the result was already taken through
/// [`try_result`](Self::try_result), it resolves to a failure wrapping [`Error::ResultTaken`].
/// Dropping it doesn't stop the job, use the [`JobMonitor`] for that.
///
/// [`JobMonitor`]: crate::JobMonitor
pub struct JobTask<D, T> {
	job: JobHandle,
	definition: Arc<D>,
	result_rx: Option<oneshot::Receiver<Result<T, JobError>>>,
}

impl<D: JobDefinition, T> fmt::Debug for JobTask<D, T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("JobTask")
			.field("job", &self.job)
			.field("result_taken", &self.result_rx.is_none())
			.finish_non_exhaustive()
	}
}

impl<D: JobDefinition, T> JobTask<D, T> {
	pub(crate) const fn new(
		job: JobHandle,
		definition: Arc<D>,
		result_rx: oneshot::Receiver<Result<T, JobError>>,
	) -> Self {
		Self {
			job,
			definition,
			result_rx: Some(result_rx),
		}
	}

	#[must_use]
	pub const fn job(&self) -> &JobHandle {
		&self.job
	}

	#[must_use]
	pub fn definition(&self) -> &D {
		&self.definition
	}

	/// Takes the result without waiting, if the job already finished.
	///
	/// The result can only be taken once, either here or by awaiting the task.
	pub fn try_result(&mut self) -> Result<T, Error> {
		let id = self.job.id();
		let Some(result_rx) = self.result_rx.as_mut() else {
			return Err(Error::ResultTaken(id));
		};

		match result_rx.try_recv() {
			Ok(res) => {
				self.result_rx = None;
				res.map_err(Into::into)
			}
			Err(TryRecvError::Empty) => Err(Error::ResultNotReady(id)),
			Err(TryRecvError::Closed) => {
				self.result_rx = None;
				Err(runner_dropped().into())
			}
		}
	}
}

impl<D: JobDefinition, T> Future for JobTask<D, T> {
	type Output = Result<T, JobError>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		let Some(result_rx) = self.result_rx.as_mut() else {
			return Poll::Ready(Err(JobError::failed(Error::ResultTaken(self.job.id()))));
		};

		Pin::new(result_rx).poll(cx).map(|res| {
			self.result_rx = None;
			res.unwrap_or_else(|_| Err(runner_dropped()))
		})
	}
}

/// The runner only goes away without reporting when the runtime is shutting down.
fn runner_dropped() -> JobError {
	OperationCanceled::detached()
		.with_message("job runner dropped before reporting a result")
		.into()
}

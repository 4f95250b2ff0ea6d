use std::{borrow::Cow, error::Error as StdError, fmt, sync::Arc};

use thiserror::Error;

use super::{job::JobId, status::JobStatus, token::SourceId};

#[derive(Debug, Error)]
pub enum Error {
	#[error("percent value out of range: {0}")]
	InvalidPercent(f64),
	#[error("illegal status transition <id='{id}'>: {from} -> {to}")]
	IllegalTransition {
		id: JobId,
		from: JobStatus,
		to: JobStatus,
	},
	#[error("job not found: <id='{0}'>")]
	NotFound(JobId),
	#[error("job result not available yet <id='{0}'>")]
	ResultNotReady(JobId),
	#[error("job result was already taken <id='{0}'>")]
	ResultTaken(JobId),

	#[error(transparent)]
	Job(#[from] JobError),
}

/// Cooperative cancellation error, returned by every suspension point of a job.
///
/// Carries the cancellation source that was current when it was raised, so force pause aware
/// definitions can tell a pause apart from a real cancellation through
/// [`JobCancellationToken::is_pausing_cancellation`](crate::JobCancellationToken::is_pausing_cancellation).
#[derive(Debug, Clone)]
pub struct OperationCanceled {
	message: Option<Cow<'static, str>>,
	pub(crate) source: Option<SourceId>,
}

impl OperationCanceled {
	pub(crate) const fn from_source(source: SourceId) -> Self {
		Self {
			message: None,
			source: Some(source),
		}
	}

	/// A cancellation raised by code that isn't tied to any job token.
	#[must_use]
	pub const fn detached() -> Self {
		Self {
			message: None,
			source: None,
		}
	}

	#[must_use]
	pub fn with_message(mut self, message: impl Into<Cow<'static, str>>) -> Self {
		self.message = Some(message.into());
		self
	}

	#[must_use]
	pub fn message(&self) -> Option<&str> {
		self.message.as_deref()
	}
}

impl fmt::Display for OperationCanceled {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.message {
			Some(message) => write!(f, "operation canceled: {message}"),
			None => write!(f, "operation canceled"),
		}
	}
}

impl StdError for OperationCanceled {}

/// Error type returned by job definitions, and re-surfaced to everyone waiting on the job.
///
/// It is cheap to clone, as every waiter of a job receives the same failure.
#[derive(Debug, Clone, Error)]
pub enum JobError {
	#[error(transparent)]
	Canceled(#[from] OperationCanceled),
	#[error("job failed: {0}")]
	Failed(Arc<dyn StdError + Send + Sync>),
	#[error("job panicked: {0}")]
	Panicked(String),
}

impl JobError {
	/// Wraps any error as a job failure, keeping the original error around.
	pub fn failed(e: impl StdError + Send + Sync + 'static) -> Self {
		Self::Failed(Arc::new(e))
	}

	#[must_use]
	pub const fn is_canceled(&self) -> bool {
		matches!(self, Self::Canceled(_))
	}

	/// Tries to get the original error back from a [`JobError::Failed`].
	#[must_use]
	pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
		match self {
			Self::Failed(e) => e.downcast_ref::<E>(),
			Self::Canceled(_) | Self::Panicked(_) => None,
		}
	}
}

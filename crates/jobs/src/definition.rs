use std::fmt;

use async_trait::async_trait;
use downcast_rs::{impl_downcast, DowncastSync};

use super::{context::JobContext, error::JobError};

/// Pure data describing some work to be done by a job.
///
/// The definition can be downcasted back to its concrete type from any
/// [`Job`](crate::Job) handle, so observers can filter jobs by their kind.
pub trait JobDefinition: DowncastSync {
	/// Declares that [`JobDefinitionWithStart::start`] can handle its cancellation token being
	/// tripped by a pause, telling it apart through
	/// [`JobContext::handle_pause_error`]. The monitor trusts this flag when pausing.
	fn supports_force_pause(&self) -> bool {
		false
	}

	/// Jobs that can't be paused get cancelled instead when a pause is requested.
	fn supports_pausing(&self) -> bool {
		true
	}

	/// A human readable name for the kind of job, used on logs.
	fn name(&self) -> &'static str {
		std::any::type_name::<Self>()
	}
}

impl_downcast!(sync JobDefinition);

impl fmt::Debug for dyn JobDefinition {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "<JobDefinition name='{}'>", self.name())
	}
}

/// A job definition that also knows how to run itself.
///
/// We're using the [`async_trait`](https://docs.rs/async-trait) crate here, so definitions can be
/// stored and run behind type erased handles.
#[async_trait]
pub trait JobDefinitionWithStart: JobDefinition + Sized {
	type Output: Send + 'static;

	/// The sole entry point of a job. It should call [`JobContext::yield_now`] regularly, as
	/// pausing and cancelling only take effect there.
	async fn start(&self, ctx: &JobContext<Self>) -> Result<Self::Output, JobError>;
}

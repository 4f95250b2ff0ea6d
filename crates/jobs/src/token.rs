use std::{
	future::Future,
	pin::Pin,
	sync::atomic::{AtomicU64, Ordering},
	task::{Context, Poll},
};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::trace;

use super::error::OperationCanceled;

/// Identifies one cancellation source handed out by a [`JobCancellationToken`].
pub(crate) type SourceId = u64;

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

fn next_source_id() -> SourceId {
	NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CancellationReason {
	Cancelled,
	Paused,
}

#[derive(Debug)]
struct Source {
	id: SourceId,
	token: CancellationToken,
}

#[derive(Debug)]
struct State {
	reason: Option<CancellationReason>,
	current: Source,
	last_paused_source: Option<SourceId>,
}

/// A cancellation token supporting cancellation plus pause and resume of a job.
///
/// By default pausing is purely cooperative: the job only stops at its next
/// [`yield_now`](crate::JobContext::yield_now). With `supports_force_pause`, pausing also trips the
/// current cancellation source, interrupting any await raced against it; a fresh source is issued
/// on resume, so later awaits see a non cancelled token again.
///
/// True cancellation trips a permanent root source that every issued source descends from.
#[derive(Debug)]
pub struct JobCancellationToken {
	root: CancellationToken,
	state: Mutex<State>,
	gate: watch::Sender<bool>,
	supports_force_pause: bool,
}

impl JobCancellationToken {
	#[must_use]
	pub fn new(supports_force_pause: bool) -> Self {
		Self::with_root(CancellationToken::new(), supports_force_pause)
	}

	/// Creates a token that also gets cancelled when `parent` is cancelled.
	#[must_use]
	pub fn linked(parent: &CancellationToken, supports_force_pause: bool) -> Self {
		Self::with_root(parent.child_token(), supports_force_pause)
	}

	fn with_root(root: CancellationToken, supports_force_pause: bool) -> Self {
		let current = Source {
			id: next_source_id(),
			token: root.child_token(),
		};

		Self {
			root,
			state: Mutex::new(State {
				reason: None,
				current,
				last_paused_source: None,
			}),
			gate: watch::Sender::new(true),
			supports_force_pause,
		}
	}

	#[must_use]
	pub const fn supports_force_pause(&self) -> bool {
		self.supports_force_pause
	}

	#[must_use]
	pub fn is_paused(&self) -> bool {
		!self.root.is_cancelled() && self.state.lock().reason == Some(CancellationReason::Paused)
	}

	#[must_use]
	pub fn is_cancelled(&self) -> bool {
		self.root.is_cancelled() || self.state.lock().reason == Some(CancellationReason::Cancelled)
	}

	/// The current cancellation source, to be shared with any cancellable API.
	///
	/// With force pause this source may be swapped on resume, so take a fresh one after resuming.
	#[must_use]
	pub fn token(&self) -> CancellationToken {
		self.state.lock().current.token.clone()
	}

	pub fn throw_if_cancellation_requested(&self) -> Result<(), OperationCanceled> {
		let state = self.state.lock();

		if state.current.token.is_cancelled() {
			Err(OperationCanceled::from_source(state.current.id))
		} else {
			Ok(())
		}
	}

	/// Cancels the job for good, a cancelled token can't be paused or resumed anymore.
	pub fn cancel(&self) {
		let mut state = self.state.lock();
		state.reason = Some(CancellationReason::Cancelled);
		self.root.cancel();

		trace!("Job token cancelled");
	}

	pub fn pause(&self) {
		let mut state = self.state.lock();

		if self.root.is_cancelled() || state.reason.is_some() {
			trace!(reason = ?state.reason, "Ignoring pause request");
			return;
		}

		state.reason = Some(CancellationReason::Paused);
		self.gate.send_replace(false);

		if self.supports_force_pause {
			trace!(source_id = state.current.id, "Force pausing, cancelling current source");
			state.current.token.cancel();
			state.last_paused_source = Some(state.current.id);
		} else {
			trace!("Job token paused");
		}
	}

	pub fn resume(&self) {
		let mut state = self.state.lock();

		if self.root.is_cancelled() || state.reason != Some(CancellationReason::Paused) {
			trace!(reason = ?state.reason, "Ignoring resume request");
			return;
		}

		state.reason = None;
		if self.supports_force_pause {
			self.recycle_token(&mut state);
		}
		self.gate.send_replace(true);

		trace!("Job token resumed");
	}

	fn recycle_token(&self, state: &mut State) {
		let previous = std::mem::replace(
			&mut state.current,
			Source {
				id: next_source_id(),
				token: self.root.child_token(),
			},
		);

		trace!(
			previous_source_id = previous.id,
			source_id = state.current.id,
			"Recycled cancellation source"
		);
	}

	/// Waits until the token isn't paused anymore.
	///
	/// Returns immediately when not paused, and with an error if the job gets cancelled while
	/// waiting.
	pub async fn wait_for_resume(&self) -> Result<(), OperationCanceled> {
		let mut gate = self.gate.subscribe();

		tokio::select! {
			biased;

			() = self.root.cancelled() => Err(self.canceled_error()),

			res = gate.wait_for(|is_open| *is_open) => {
				// The sender lives as long as `self`, so this can't fail while we're borrowed
				res.map(|_| ()).map_err(|_| self.canceled_error())
			}
		}
	}

	/// Checks if `err` was raised because of a force pause of this token, rather than a real
	/// cancellation.
	#[must_use]
	pub fn is_pausing_cancellation(&self, err: &OperationCanceled) -> bool {
		if !self.supports_force_pause || self.root.is_cancelled() {
			return false;
		}

		let state = self.state.lock();

		state.reason == Some(CancellationReason::Paused) && err.source == Some(state.current.id)
	}

	/// Checks if `err` was raised by a force pause that got resumed before the job could handle
	/// it, so the job can carry on without waiting.
	pub(crate) fn is_resumed_pause_cancellation(&self, err: &OperationCanceled) -> bool {
		if !self.supports_force_pause || self.root.is_cancelled() {
			return false;
		}

		let state = self.state.lock();

		state.reason.is_none()
			&& err.source.is_some()
			&& err.source == state.last_paused_source
	}

	/// Races `fut` against the current cancellation source.
	///
	/// If the source gets cancelled first, resolves to an error that
	/// [`is_pausing_cancellation`](Self::is_pausing_cancellation) can classify.
	pub fn run_until_cancelled<F: Future>(&self, fut: F) -> Cancellable<F> {
		let state = self.state.lock();

		Cancellable {
			fut,
			cancelled: state.current.token.clone().cancelled_owned(),
			source: state.current.id,
		}
	}

	fn canceled_error(&self) -> OperationCanceled {
		OperationCanceled::from_source(self.state.lock().current.id)
	}
}

impl Default for JobCancellationToken {
	fn default() -> Self {
		Self::new(false)
	}
}

pin_project_lite::pin_project! {
	/// Future returned by [`JobCancellationToken::run_until_cancelled`].
	#[must_use = "`Cancellable` does nothing unless polled"]
	pub struct Cancellable<F> {
		#[pin]
		fut: F,
		#[pin]
		cancelled: WaitForCancellationFutureOwned,
		source: SourceId,
	}
}

impl<F: Future> Future for Cancellable<F> {
	type Output = Result<F::Output, OperationCanceled>;

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		let this = self.project();

		if this.cancelled.poll(cx).is_ready() {
			return Poll::Ready(Err(OperationCanceled::from_source(*this.source)));
		}

		this.fut.poll(cx).map(Ok)
	}
}

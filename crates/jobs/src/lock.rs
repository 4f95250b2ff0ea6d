use tokio::sync::{Mutex, MutexGuard};
use tracing::trace;

/// A single permit asynchronous lock, released when the returned guard is dropped.
///
/// Used to serialize control requests for a job, but it doesn't protect any data by itself,
/// so it can guard any critical section.
#[derive(Debug, Default)]
pub struct ScopedAsyncLock {
	inner: Mutex<()>,
}

/// Releases the permit of a [`ScopedAsyncLock`] exactly once, on drop.
#[derive(Debug)]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ScopedLockGuard<'lock> {
	_guard: MutexGuard<'lock, ()>,
}

impl ScopedAsyncLock {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn lock(&self) -> ScopedLockGuard<'_> {
		let guard = self.inner.lock().await;
		trace!("Acquired scoped lock");

		ScopedLockGuard { _guard: guard }
	}

	/// Blocking version of [`lock`](Self::lock), for synchronous callers.
	///
	/// # Panics
	///
	/// Panics if called from within an asynchronous execution context.
	pub fn lock_blocking(&self) -> ScopedLockGuard<'_> {
		ScopedLockGuard {
			_guard: self.inner.blocking_lock(),
		}
	}

	pub fn try_lock(&self) -> Option<ScopedLockGuard<'_>> {
		self.inner
			.try_lock()
			.ok()
			.map(|guard| ScopedLockGuard { _guard: guard })
	}
}

use std::{
	fmt,
	panic::{catch_unwind, AssertUnwindSafe},
	time::Duration,
};

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::trace;

use super::percent::Percent;

/// Minimum time between two progress emissions of a [`CompositeProgress`].
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

/// Receives progress of a multi step operation.
pub trait ProgressUpdater: Send + Sync {
	/// Marks the current step as done and moves on to the next one.
	fn next_step(&self);

	/// Sets the progress within the current step, in the `[0.0, 1.0]` range.
	///
	/// Progress within a step only moves forward, lower values than the last one are ignored.
	fn set_step_progress(&self, progress: f64);

	fn report(&self, progress: f64) {
		self.set_step_progress(progress);
	}
}

type Callback = Box<dyn Fn(Percent) + Send + Sync>;

#[derive(Debug)]
struct State {
	completed_steps: usize,
	step_progress: f64,
	finished: bool,
	last_emitted_at: Option<Instant>,
}

/// Presents `steps` steps of progress as a single percentage.
///
/// The overall value is `completed_steps / steps + step_progress / steps`. The callback fires
/// at most once per interval, except for the final 100% which is always delivered. A panicking
/// callback never takes the instrumented job down with it.
pub struct CompositeProgress {
	steps: usize,
	interval: Duration,
	state: Mutex<State>,
	callback: Callback,
}

impl fmt::Debug for CompositeProgress {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CompositeProgress")
			.field("steps", &self.steps)
			.field("interval", &self.interval)
			.field("state", &self.state)
			.finish_non_exhaustive()
	}
}

impl CompositeProgress {
	pub fn new(steps: usize, callback: impl Fn(Percent) + Send + Sync + 'static) -> Self {
		Self {
			steps,
			interval: DEFAULT_PROGRESS_INTERVAL,
			state: Mutex::new(State {
				completed_steps: 0,
				step_progress: 0.0,
				finished: steps == 0,
				last_emitted_at: None,
			}),
			callback: Box::new(callback),
		}
	}

	#[must_use]
	pub const fn with_interval(mut self, interval: Duration) -> Self {
		self.interval = interval;
		self
	}

	#[must_use]
	pub const fn steps(&self) -> usize {
		self.steps
	}

	#[must_use]
	pub fn completed_steps(&self) -> usize {
		self.state.lock().completed_steps
	}

	#[must_use]
	pub fn is_finished(&self) -> bool {
		self.state.lock().finished
	}

	#[must_use]
	pub fn current(&self) -> Percent {
		self.overall(&self.state.lock())
	}

	/// Emits the current value right away, ignoring the throttling interval.
	pub fn flush(&self) {
		let percent = {
			let mut state = self.state.lock();
			state.last_emitted_at = Some(Instant::now());
			self.overall(&state)
		};

		self.emit(percent);
	}

	fn overall(&self, state: &State) -> Percent {
		if state.finished {
			return Percent::ONE;
		}

		let steps = self.steps as f64;
		Percent::create_clamped(
			state.completed_steps as f64 / steps + state.step_progress / steps,
		)
	}

	fn update(&self, change: impl FnOnce(&mut State, usize)) {
		let to_emit = {
			let mut state = self.state.lock();
			if state.finished {
				return;
			}

			change(&mut state, self.steps);

			let now = Instant::now();
			let interval_elapsed = state
				.last_emitted_at
				.map_or(true, |last| now.duration_since(last) >= self.interval);

			if state.finished || interval_elapsed {
				state.last_emitted_at = Some(now);
				Some(self.overall(&state))
			} else {
				None
			}
		};

		if let Some(percent) = to_emit {
			self.emit(percent);
		}
	}

	fn emit(&self, percent: Percent) {
		if catch_unwind(AssertUnwindSafe(|| (self.callback)(percent))).is_err() {
			trace!(%percent, "Progress callback panicked, ignoring");
		}
	}
}

impl ProgressUpdater for CompositeProgress {
	fn next_step(&self) {
		self.update(|state, steps| {
			state.completed_steps += 1;
			state.step_progress = 0.0;
			if state.completed_steps >= steps {
				state.finished = true;
			}
		});
	}

	fn set_step_progress(&self, progress: f64) {
		self.update(|state, _| {
			state.step_progress = state
				.step_progress
				.max(Percent::create_clamped(progress).value());
		});
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use tokio::time::advance;

	use super::*;

	fn recorder() -> (Arc<Mutex<Vec<Percent>>>, impl Fn(Percent) + Send + Sync + 'static) {
		let reported = Arc::new(Mutex::new(Vec::new()));
		let callback = {
			let reported = Arc::clone(&reported);
			move |percent| reported.lock().push(percent)
		};

		(reported, callback)
	}

	#[tokio::test(start_paused = true)]
	async fn two_steps_of_four_is_half() {
		let (reported, callback) = recorder();
		let progress = CompositeProgress::new(4, callback);

		progress.next_step();
		advance(Duration::from_millis(300)).await;
		progress.next_step();

		assert_eq!(reported.lock().last().copied(), Some(Percent::create(1, 2)));
		assert_eq!(progress.completed_steps(), 2);
	}

	#[tokio::test(start_paused = true)]
	async fn steps_past_the_end_are_ignored() {
		let (reported, callback) = recorder();
		let progress = CompositeProgress::new(4, callback);

		for _ in 0..4 {
			progress.next_step();
		}

		assert!(progress.is_finished());
		assert_eq!(reported.lock().last().copied(), Some(Percent::ONE));
		let emitted = reported.lock().len();

		advance(Duration::from_secs(1)).await;
		progress.next_step();
		progress.set_step_progress(0.5);

		assert_eq!(reported.lock().len(), emitted);
		assert_eq!(progress.completed_steps(), 4);
		assert_eq!(progress.current(), Percent::ONE);
	}

	#[tokio::test(start_paused = true)]
	async fn emissions_are_throttled() {
		let (reported, callback) = recorder();
		let progress = CompositeProgress::new(2, callback);

		for i in 0..10 {
			progress.report(f64::from(i) / 10.0);
		}
		assert_eq!(reported.lock().len(), 1);
		assert_eq!(progress.current(), Percent::create(9, 20));

		advance(DEFAULT_PROGRESS_INTERVAL).await;
		progress.set_step_progress(1.0);

		assert_eq!(*reported.lock(), vec![Percent::ZERO, Percent::create(1, 2)]);

		progress.flush();
		assert_eq!(reported.lock().len(), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn custom_interval() {
		let (reported, callback) = recorder();
		let progress = CompositeProgress::new(10, callback).with_interval(Duration::from_secs(5));

		progress.next_step();
		advance(DEFAULT_PROGRESS_INTERVAL).await;
		progress.next_step();
		assert_eq!(reported.lock().len(), 1);

		advance(Duration::from_secs(5)).await;
		progress.next_step();
		assert_eq!(reported.lock().len(), 2);
	}

	#[tokio::test(start_paused = true)]
	async fn step_progress_never_goes_backwards() {
		let (reported, callback) = recorder();
		let progress = CompositeProgress::new(2, callback);

		progress.set_step_progress(0.5);
		advance(DEFAULT_PROGRESS_INTERVAL).await;
		progress.set_step_progress(0.2);

		assert_eq!(progress.current(), Percent::create(1, 4));
		assert_eq!(
			*reported.lock(),
			vec![Percent::create(1, 4), Percent::create(1, 4)]
		);

		progress.next_step();
		advance(DEFAULT_PROGRESS_INTERVAL).await;
		progress.set_step_progress(0.5);
		assert_eq!(progress.current(), Percent::create(3, 4));
	}

	#[test]
	fn panicking_callback_is_swallowed() {
		let progress = CompositeProgress::new(1, |_| panic!("subscriber went away"));

		progress.set_step_progress(0.5);
		progress.next_step();

		assert!(progress.is_finished());
	}

	#[test]
	fn zero_steps_is_already_finished() {
		let progress = CompositeProgress::new(0, |_| {});

		assert!(progress.is_finished());
		assert_eq!(progress.current(), Percent::ONE);
	}
}

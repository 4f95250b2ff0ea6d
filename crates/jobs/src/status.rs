use std::fmt;

/// The lifecycle of a job.
///
/// Legal transitions are `None -> Created -> Running`, `Running <-> Paused` and
/// `Running | Paused -> Completed | Cancelled | Failed`. A job can also be cancelled while
/// still `Created`. `Completed`, `Cancelled` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum JobStatus {
	#[default]
	None = 0,
	Created = 1,
	Running = 2,
	Paused = 3,
	Completed = 4,
	Cancelled = 5,
	Failed = 6,
}

impl JobStatus {
	/// A job is active while it is `Running` or `Paused`.
	#[must_use]
	pub const fn is_active(self) -> bool {
		matches!(self, Self::Running | Self::Paused)
	}

	#[must_use]
	pub const fn is_terminal(self) -> bool {
		matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
	}

	/// Whether the job went from a non active status into an active one.
	///
	/// A missing previous status counts as `None`, so a job's first activation is reported.
	#[must_use]
	pub const fn was_activated(self, previous: Option<Self>) -> bool {
		let previous = match previous {
			Some(previous) => previous,
			None => Self::None,
		};

		self.is_active() && !previous.is_active()
	}

	/// Whether the job went from an active status into a non active one.
	///
	/// A missing previous status counts as `Running`, so that a job's very first status
	/// is never reported as both activated and deactivated.
	#[must_use]
	pub const fn was_deactivated(self, previous: Option<Self>) -> bool {
		let previous = match previous {
			Some(previous) => previous,
			None => Self::Running,
		};

		previous.is_active() && !self.is_active()
	}

	#[must_use]
	pub const fn can_transition_to(self, next: Self) -> bool {
		matches!(
			(self, next),
			(Self::None, Self::Created)
				| (Self::Created, Self::Running | Self::Cancelled)
				| (Self::Running, Self::Paused)
				| (Self::Paused, Self::Running)
				| (
					Self::Running | Self::Paused,
					Self::Completed | Self::Cancelled | Self::Failed
				)
		)
	}
}

impl TryFrom<u8> for JobStatus {
	type Error = u8;

	fn try_from(value: u8) -> Result<Self, Self::Error> {
		Ok(match value {
			0 => Self::None,
			1 => Self::Created,
			2 => Self::Running,
			3 => Self::Paused,
			4 => Self::Completed,
			5 => Self::Cancelled,
			6 => Self::Failed,
			other => return Err(other),
		})
	}
}

impl From<JobStatus> for u8 {
	fn from(status: JobStatus) -> Self {
		status as Self
	}
}

impl fmt::Display for JobStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			Self::None => "none",
			Self::Created => "created",
			Self::Running => "running",
			Self::Paused => "paused",
			Self::Completed => "completed",
			Self::Cancelled => "cancelled",
			Self::Failed => "failed",
		};

		f.write_str(s)
	}
}

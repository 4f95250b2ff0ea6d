use std::{
	cmp::Ordering,
	fmt,
	hash::{Hash, Hasher},
	str::FromStr,
};

use super::error::Error;

/// A percentage in the `[0.0, 1.0]` range, used to report progress of jobs.
///
/// The inner value is never `NaN`, infinite or out of range, so it can be totally ordered.
#[derive(Debug, Clone, Copy, Default)]
pub struct Percent(f64);

impl Percent {
	pub const ZERO: Self = Self(0.0);
	pub const ONE: Self = Self(1.0);

	/// Creates a new percentage, failing if the value is `NaN`, infinite or outside `[0.0, 1.0]`.
	pub fn new(value: f64) -> Result<Self, Error> {
		if Self::in_range(value) {
			Ok(Self::normalized(value))
		} else {
			Err(Error::InvalidPercent(value))
		}
	}

	/// Creates a percentage saturating any value outside of the permitted range.
	///
	/// `NaN` becomes 0%, positive infinity 100% and negative infinity 0%.
	#[must_use]
	pub fn create_clamped(value: f64) -> Self {
		if value.is_nan() {
			Self::ZERO
		} else {
			Self::normalized(value.clamp(0.0, 1.0))
		}
	}

	// -0.0 becomes 0.0, keeping `Eq`, `Ord` and `Hash` consistent
	fn normalized(value: f64) -> Self {
		Self(value + 0.0)
	}

	/// Creates a percentage from a current and maximum value, clamping the result.
	///
	/// A zero `maximum` yields 0%.
	#[must_use]
	pub fn create<T: ProgressUnit>(current: T, maximum: T) -> Self {
		let maximum = maximum.as_f64();
		if maximum == 0.0 {
			return Self::ZERO;
		}

		Self::create_clamped(current.as_f64() / maximum)
	}

	#[must_use]
	pub fn in_range(value: f64) -> bool {
		(0.0..=1.0).contains(&value)
	}

	#[must_use]
	pub const fn value(self) -> f64 {
		self.0
	}

	/// Converts e.g. 10% done into 90% left.
	#[must_use]
	pub fn inverse(self) -> Self {
		Self::normalized(1.0 - self.0)
	}

	pub fn checked_add(self, rhs: Self) -> Result<Self, Error> {
		Self::new(self.0 + rhs.0)
	}

	pub fn checked_sub(self, rhs: Self) -> Result<Self, Error> {
		Self::new(self.0 - rhs.0)
	}
}

impl PartialEq for Percent {
	fn eq(&self, other: &Self) -> bool {
		self.0 == other.0
	}
}

impl Eq for Percent {}

impl PartialOrd for Percent {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for Percent {
	fn cmp(&self, other: &Self) -> Ordering {
		self.0.total_cmp(&other.0)
	}
}

impl Hash for Percent {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.0.to_bits().hash(state);
	}
}

impl TryFrom<f64> for Percent {
	type Error = Error;

	fn try_from(value: f64) -> Result<Self, Self::Error> {
		Self::new(value)
	}
}

impl From<Percent> for f64 {
	fn from(percent: Percent) -> Self {
		percent.0
	}
}

/// Renders as `50%`; a precision renders decimals, `{:.2}` gives `33.33%`.
impl fmt::Display for Percent {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let precision = f.precision().unwrap_or(0);
		write!(f, "{:.precision$}%", self.0 * 100.0)
	}
}

/// Parses a number in the `0..=100` range, with an optional trailing `%`.
impl FromStr for Percent {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let trimmed = s.trim();
		let number = trimmed.strip_suffix('%').unwrap_or(trimmed).trim_end();

		let value = number
			.parse::<f64>()
			.map_err(|_| Error::InvalidPercent(f64::NAN))?;

		Self::new(value / 100.0)
	}
}

/// Numeric types that can be used as progress units in [`Percent::create`].
pub trait ProgressUnit: Copy {
	fn as_f64(self) -> f64;
}

macro_rules! impl_progress_unit {
	($($ty:ty),+ $(,)?) => {
		$(
			impl ProgressUnit for $ty {
				#[allow(trivial_numeric_casts, clippy::cast_lossless)]
				fn as_f64(self) -> f64 {
					self as f64
				}
			}
		)+
	};
}

impl_progress_unit!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64);

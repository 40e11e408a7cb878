//! Lease duration parsing.
//!
//! Accepts Go-style duration strings (`4h`, `1h30m`, `1.5h`, `250ms`) and bare integers, which
//! are read as seconds.

// self
use crate::{_prelude::*, error::UserError};

const UNITS: &[(&str, i128)] = &[
	("ns", 1),
	("us", 1_000),
	("µs", 1_000),
	("μs", 1_000),
	("ms", 1_000_000),
	("s", 1_000_000_000),
	("m", 60_000_000_000),
	("h", 3_600_000_000_000),
];

/// Reasons a duration string is rejected.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum DurationError {
	/// Nothing to parse.
	#[error("duration is empty")]
	Empty,
	/// A number is missing or malformed.
	#[error("invalid number in duration {0:?}")]
	InvalidNumber(String),
	/// A number has no unit, or the unit is unknown.
	#[error("unknown unit {0:?} in duration")]
	UnknownUnit(String),
	/// The value does not fit in a duration.
	#[error("duration is out of range")]
	OutOfRange,
}

/// Parses a signed duration string.
pub fn parse(raw: &str) -> Result<Duration, DurationError> {
	let trimmed = raw.trim();

	if trimmed.is_empty() {
		return Err(DurationError::Empty);
	}
	if let Ok(secs) = trimmed.parse::<i64>() {
		return Ok(Duration::seconds(secs));
	}

	let (negative, mut rest) = match trimmed.as_bytes()[0] {
		b'-' => (true, &trimmed[1..]),
		b'+' => (false, &trimmed[1..]),
		_ => (false, trimmed),
	};

	if rest == "0" {
		return Ok(Duration::ZERO);
	}
	if rest.is_empty() {
		return Err(DurationError::InvalidNumber(trimmed.to_owned()));
	}

	let mut total_nanos = 0_i128;

	while !rest.is_empty() {
		let number_len =
			rest.find(|c: char| !(c.is_ascii_digit() || c == '.')).unwrap_or(rest.len());
		let (number, tail) = rest.split_at(number_len);

		if number.is_empty() || number == "." {
			return Err(DurationError::InvalidNumber(trimmed.to_owned()));
		}

		let unit_len = tail.find(|c: char| c.is_ascii_digit() || c == '.').unwrap_or(tail.len());
		let (unit, tail) = tail.split_at(unit_len);
		let scale = UNITS
			.iter()
			.find_map(|(name, scale)| (*name == unit).then_some(*scale))
			.ok_or_else(|| DurationError::UnknownUnit(unit.to_owned()))?;

		total_nanos = total_nanos
			.checked_add(scaled(number, scale, trimmed)?)
			.ok_or(DurationError::OutOfRange)?;
		rest = tail;
	}

	if negative {
		total_nanos = -total_nanos;
	}

	let nanos = i64::try_from(total_nanos).map_err(|_| DurationError::OutOfRange)?;

	Ok(Duration::nanoseconds(nanos))
}

/// Parses a lease string that must describe a strictly positive duration.
///
/// The error names the offending value so callers can surface it verbatim.
pub fn parse_lease(raw: &str) -> Result<Duration, UserError> {
	let invalid = |reason: String| UserError::InvalidLease { value: raw.to_owned(), reason };
	let lease = parse(raw).map_err(|e| invalid(e.to_string()))?;

	if !lease.is_positive() {
		return Err(invalid("lease must be positive".into()));
	}

	Ok(lease)
}

/// Renders a duration in Go notation (`2h0m0s`), as reported back to operators.
pub fn format(duration: Duration) -> String {
	let mut secs = duration.whole_seconds();
	let sign = if secs < 0 { "-" } else { "" };

	secs = secs.abs();

	let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);

	if hours > 0 {
		format!("{sign}{hours}h{minutes}m{seconds}s")
	} else if minutes > 0 {
		format!("{sign}{minutes}m{seconds}s")
	} else {
		format!("{sign}{seconds}s")
	}
}

fn scaled(number: &str, scale: i128, raw: &str) -> Result<i128, DurationError> {
	let invalid = || DurationError::InvalidNumber(raw.to_owned());
	let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));

	if fraction.contains('.') {
		return Err(invalid());
	}

	let whole = if whole.is_empty() { 0 } else { whole.parse::<i128>().map_err(|_| invalid())? };
	let mut nanos = whole.checked_mul(scale).ok_or(DurationError::OutOfRange)?;
	let mut divisor = 1_i128;

	for digit in fraction.chars().take(18) {
		divisor *= 10;

		let value = i128::from(digit.to_digit(10).ok_or_else(invalid)?);

		nanos += value * scale / divisor;
	}

	Ok(nanos)
}

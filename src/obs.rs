//! Observability helpers for backend operations.
//!
//! - Every instrumented operation runs inside a `tracing` span named `hydra_broker.op` with the
//!   `op` and `stage` fields.
//! - Enable the `metrics` feature to increment the `hydra_broker_op_total` counter for every
//!   attempt/success/failure, labeled by `op` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Backend operations observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
	/// `config/root` write.
	ConfigWrite,
	/// Role validation + persistence.
	RoleWrite,
	/// Credential issuance.
	Issue,
	/// Lease renewal.
	Renew,
	/// Lease revocation.
	Revoke,
	/// Execution of one journal entry.
	Rollback,
	/// Recovery pass over the journal.
	Sweep,
}
impl OpKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpKind::ConfigWrite => "config_write",
			OpKind::RoleWrite => "role_write",
			OpKind::Issue => "issue",
			OpKind::Renew => "renew",
			OpKind::Revoke => "revoke",
			OpKind::Rollback => "rollback",
			OpKind::Sweep => "sweep",
		}
	}
}
impl Display for OpKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpOutcome {
	/// Entry to an operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl OpOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpOutcome::Attempt => "attempt",
			OpOutcome::Success => "success",
			OpOutcome::Failure => "failure",
		}
	}
}
impl Display for OpOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Records the success/failure outcome matching `result`.
pub fn record_result<T>(kind: OpKind, result: &Result<T>) {
	match result {
		Ok(_) => record_op_outcome(kind, OpOutcome::Success),
		Err(e) => {
			::tracing::debug!(op = kind.as_str(), error = %e, "operation failed");
			record_op_outcome(kind, OpOutcome::Failure);
		},
	}
}

//! Durable rollback journal guaranteeing at-least-once upstream cleanup.
//!
//! An entry is committed to the store before its action is attempted and cleared only after the
//! action is confirmed. Entries left behind by a failure or a crash are retried by
//! [`RollbackJournal::sweep`]. Handlers tolerate repeated execution: deleting a client that is
//! already gone counts as success.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::{
	_prelude::*,
	config::ConfigStore,
	error::CorruptionError,
	obs::{self, OpKind, OpOutcome, OpSpan},
	store::{self, Storage},
	upstream::ProviderConnector,
};

/// Storage prefix reserved for journal entries.
pub const WAL_PREFIX: &str = "wal/";
/// Kind label of [`RollbackOp::DeleteClient`].
pub const CLIENT_KIND: &str = "client";
/// Minimum entry age before a sweep retries it.
pub const DEFAULT_MIN_AGE: Duration = Duration::minutes(5);

/// Cleanup actions the journal knows how to perform.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RollbackOp {
	/// Delete an upstream OAuth 2.0 client.
	DeleteClient {
		/// Upstream client id.
		id: String,
	},
}
impl RollbackOp {
	/// Stable kind label persisted with the entry.
	pub fn kind(&self) -> &'static str {
		match self {
			Self::DeleteClient { .. } => CLIENT_KIND,
		}
	}

	/// Payload persisted with the entry.
	pub fn payload(&self) -> serde_json::Value {
		match self {
			Self::DeleteClient { id } => serde_json::Value::String(id.clone()),
		}
	}

	/// Rebuilds an operation from its persisted kind and payload.
	pub fn decode(kind: &str, payload: &serde_json::Value) -> Result<Self, CorruptionError> {
		match kind {
			CLIENT_KIND => serde_json::from_value::<String>(payload.clone())
				.map(|id| Self::DeleteClient { id })
				.map_err(|source| CorruptionError::MalformedPayload { kind: CLIENT_KIND, source }),
			other => Err(CorruptionError::UnknownKind { kind: other.to_owned() }),
		}
	}
}

/// Persisted journal entry.
///
/// `kind` stays a plain string on disk so entries written by a newer build still load and are
/// reported as [`CorruptionError::UnknownKind`] instead of vanishing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
	/// Entry identifier, unique within the journal.
	pub id: String,
	/// Operation kind label.
	pub kind: String,
	/// Operation payload.
	pub payload: serde_json::Value,
	/// Commit instant.
	pub created_at: OffsetDateTime,
}
impl JournalEntry {
	/// Decodes the operation carried by this entry.
	pub fn op(&self) -> Result<RollbackOp, CorruptionError> {
		RollbackOp::decode(&self.kind, &self.payload)
	}

	/// Returns `true` if the entry is at least `min_age` old at `now`.
	pub fn is_due(&self, now: OffsetDateTime, min_age: Duration) -> bool {
		now - self.created_at >= min_age
	}
}

/// Entry that a sweep could not clear.
#[derive(Debug)]
pub struct SweepFailure {
	/// Journal entry id.
	pub entry_id: String,
	/// Why the entry was retained.
	pub error: Error,
}

/// Outcome of a recovery sweep.
#[derive(Debug, Default)]
pub struct SweepReport {
	/// Entries executed and removed.
	pub cleared: Vec<String>,
	/// Entries younger than the minimum age, left for a later sweep.
	pub deferred: Vec<String>,
	/// Entries retained after a failure.
	pub failures: Vec<SweepFailure>,
}
impl SweepReport {
	/// Ids of every entry still in the journal after the sweep.
	pub fn retained(&self) -> impl Iterator<Item = &str> {
		self.deferred
			.iter()
			.map(String::as_str)
			.chain(self.failures.iter().map(|failure| failure.entry_id.as_str()))
	}
}

/// Durable log of pending cleanup actions.
#[derive(Clone)]
pub struct RollbackJournal {
	store: Arc<dyn Storage>,
	config: ConfigStore,
	connector: Arc<dyn ProviderConnector>,
	min_age: Duration,
	sweep_guard: Arc<AsyncMutex<()>>,
}
impl RollbackJournal {
	/// Creates a journal over the shared store.
	pub fn new(
		store: Arc<dyn Storage>,
		config: ConfigStore,
		connector: Arc<dyn ProviderConnector>,
	) -> Self {
		Self {
			store,
			config,
			connector,
			min_age: DEFAULT_MIN_AGE,
			sweep_guard: Default::default(),
		}
	}

	/// Overrides the minimum entry age considered by [`sweep`](Self::sweep).
	pub fn with_min_age(mut self, min_age: Duration) -> Self {
		self.min_age = if min_age.is_negative() { Duration::ZERO } else { min_age };

		self
	}

	/// Durably records `op` before it is attempted.
	pub async fn commit(&self, op: &RollbackOp) -> Result<JournalEntry> {
		let entry = JournalEntry {
			id: new_entry_id(),
			kind: op.kind().into(),
			payload: op.payload(),
			created_at: OffsetDateTime::now_utc(),
		};

		store::put_json(self.store.as_ref(), &entry_key(&entry.id), &entry).await?;
		tracing::debug!(entry_id = %entry.id, kind = %entry.kind, "rollback entry committed");

		Ok(entry)
	}

	/// Performs `op` against the upstream provider.
	///
	/// The configuration is read and a fresh provider client built on every call.
	pub async fn execute(&self, op: &RollbackOp) -> Result<()> {
		match op {
			RollbackOp::DeleteClient { id } => {
				let config = self.config.require().await?;
				let provider = self.connector.connect(&config)?;

				match provider.delete_client(id).await {
					Ok(()) => Ok(()),
					Err(e) if e.is_not_found() => {
						tracing::debug!(client_id = %id, "client already deleted upstream");

						Ok(())
					},
					Err(e) => Err(e.into()),
				}
			},
		}
	}

	/// Executes a stored entry and clears it once the action is confirmed.
	///
	/// On failure the entry stays in the journal for a later sweep.
	pub async fn run(&self, entry: &JournalEntry) -> Result<()> {
		const KIND: OpKind = OpKind::Rollback;

		let span = OpSpan::new(KIND, "run");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span
			.instrument(async move {
				let op = entry.op()?;

				self.execute(&op).await?;
				self.clear(&entry.id).await
			})
			.await;

		if let Err(e) = &result {
			tracing::warn!(
				entry_id = %entry.id,
				kind = %entry.kind,
				error = %e,
				"rollback entry retained"
			);
		}

		obs::record_result(KIND, &result);

		result
	}

	/// Runs `op` through the journal.
	///
	/// An entry already pending for `op` is reused, so repeated attempts never stack entries.
	pub async fn rollback(&self, op: &RollbackOp) -> Result<()> {
		let entry = match self.pending_for(op).await?.into_iter().next() {
			Some(entry) => entry,
			None => self.commit(op).await?,
		};

		self.run(&entry).await
	}

	/// Loads one entry.
	pub async fn get(&self, entry_id: &str) -> Result<Option<JournalEntry>> {
		store::get_json(self.store.as_ref(), &entry_key(entry_id)).await
	}

	/// Lists every readable stored entry.
	///
	/// Unreadable documents are logged and skipped; [`sweep`](Self::sweep) reports them.
	pub async fn pending(&self) -> Result<Vec<JournalEntry>> {
		let mut entries = Vec::new();

		for entry_id in self.store.list(WAL_PREFIX).await? {
			match self.get(&entry_id).await {
				Ok(Some(entry)) => entries.push(entry),
				Ok(None) => (),
				Err(e @ Error::Corruption(_)) => {
					tracing::error!(entry_id = %entry_id, error = %e, "unreadable rollback entry");
				},
				Err(e) => return Err(e),
			}
		}

		entries.sort_by(|a, b| a.created_at.cmp(&b.created_at));

		Ok(entries)
	}

	/// Lists stored entries carrying `op`.
	pub async fn pending_for(&self, op: &RollbackOp) -> Result<Vec<JournalEntry>> {
		let kind = op.kind();
		let payload = op.payload();

		Ok(self
			.pending()
			.await?
			.into_iter()
			.filter(|entry| entry.kind == kind && entry.payload == payload)
			.collect())
	}

	/// Operator removal of an entry without executing it. Returns whether it existed.
	pub async fn discard(&self, entry_id: &str) -> Result<bool> {
		let existed = self.get(entry_id).await?.is_some();

		if existed {
			self.clear(entry_id).await?;
			tracing::warn!(entry_id, "rollback entry discarded by operator");
		}

		Ok(existed)
	}

	/// Recovery pass: retries every entry at least the minimum age old at `now`.
	///
	/// Sweeps are serialized; corrupt entries are reported and retained.
	pub async fn sweep(&self, now: OffsetDateTime) -> Result<SweepReport> {
		const KIND: OpKind = OpKind::Sweep;

		let span = OpSpan::new(KIND, "sweep");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span
			.instrument(async move {
				let _exclusive = self.sweep_guard.lock().await;
				let mut report = SweepReport::default();

				for entry_id in self.store.list(WAL_PREFIX).await? {
					let entry = match self.get(&entry_id).await {
						Ok(Some(entry)) => entry,
						Ok(None) => continue,
						Err(error) => {
							tracing::error!(
								entry_id = %entry_id,
								error = %error,
								"unreadable rollback entry"
							);
							report.failures.push(SweepFailure { entry_id, error });

							continue;
						},
					};

					if !entry.is_due(now, self.min_age) {
						report.deferred.push(entry_id);

						continue;
					}

					match self.run(&entry).await {
						Ok(()) => report.cleared.push(entry_id),
						Err(error) => report.failures.push(SweepFailure { entry_id, error }),
					}
				}

				tracing::info!(
					cleared = report.cleared.len(),
					deferred = report.deferred.len(),
					failed = report.failures.len(),
					"rollback sweep finished"
				);

				Ok(report)
			})
			.await;

		obs::record_result(KIND, &result);

		result
	}

	async fn clear(&self, entry_id: &str) -> Result<()> {
		Ok(self.store.delete(&entry_key(entry_id)).await?)
	}
}
impl Debug for RollbackJournal {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RollbackJournal").field("min_age", &self.min_age).finish_non_exhaustive()
	}
}

fn entry_key(entry_id: &str) -> String {
	format!("{WAL_PREFIX}{entry_id}")
}

fn new_entry_id() -> String {
	URL_SAFE_NO_PAD.encode(rand::random::<[u8; 16]>())
}

//! Lease lifecycle: local renewal bookkeeping and journaled revocation.

// self
use crate::{
	_prelude::*,
	error::LeaseError,
	journal::{RollbackJournal, RollbackOp},
	obs::{self, OpKind, OpOutcome, OpSpan},
	secret::LeasedSecret,
};

/// Longest extension a single renewal grants.
pub const DEFAULT_RENEW_CAP: Duration = Duration::hours(1);
/// System-wide maximum lifetime of a lease, measured from issuance.
pub const DEFAULT_MAX_TTL: Duration = Duration::hours(768);
/// Largest limit [`LeaseLimits`] accepts; larger values are clamped to it.
pub const LIMIT_CEILING: Duration = Duration::days(100 * 365);

/// Bounds applied when extending a lease.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LeaseLimits {
	/// Per-renewal increment ceiling.
	pub renew_cap: Duration,
	/// Hard ceiling on `issued_at + lifetime`.
	pub max_ttl: Duration,
}
impl LeaseLimits {
	/// Overrides the per-renewal increment ceiling, clamped to `0..=LIMIT_CEILING`.
	pub fn with_renew_cap(mut self, renew_cap: Duration) -> Self {
		self.renew_cap = renew_cap.clamp(Duration::ZERO, LIMIT_CEILING);

		self
	}

	/// Overrides the system maximum lifetime, clamped to `0..=LIMIT_CEILING`.
	pub fn with_max_ttl(mut self, max_ttl: Duration) -> Self {
		self.max_ttl = max_ttl.clamp(Duration::ZERO, LIMIT_CEILING);

		self
	}
}
impl Default for LeaseLimits {
	fn default() -> Self {
		Self { renew_cap: DEFAULT_RENEW_CAP, max_ttl: DEFAULT_MAX_TTL }
	}
}

/// Renews and revokes leased credentials.
///
/// Renewal never talks to the provider; revocation always goes through the journal so a failed
/// delete is retried by a later sweep.
#[derive(Clone, Debug)]
pub struct LeaseManager {
	journal: RollbackJournal,
	limits: LeaseLimits,
}
impl LeaseManager {
	/// Creates a manager on top of `journal`.
	pub fn new(journal: RollbackJournal, limits: LeaseLimits) -> Self {
		Self { journal, limits }
	}

	/// Limits applied by [`renew`](Self::renew).
	pub fn limits(&self) -> LeaseLimits {
		self.limits
	}

	/// Extends `secret` starting now.
	pub async fn renew(
		&self,
		secret: &LeasedSecret,
		requested: Option<Duration>,
	) -> Result<LeasedSecret> {
		self.renew_at(secret, requested, OffsetDateTime::now_utc()).await
	}

	/// Extends `secret` as of `now`.
	///
	/// The increment is `requested` (or the current TTL when absent) capped at the renew cap; the
	/// resulting expiry never passes `issued_at + max_ttl`.
	pub async fn renew_at(
		&self,
		secret: &LeasedSecret,
		requested: Option<Duration>,
		now: OffsetDateTime,
	) -> Result<LeasedSecret> {
		const KIND: OpKind = OpKind::Renew;

		let span = OpSpan::new(KIND, "renew");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span
			.instrument(async move {
				let id = secret.credential_id()?;
				let lease = &secret.lease;

				if !lease.renewable {
					return Err(LeaseError::NotRenewable.into());
				}
				if lease.is_expired_at(now) {
					return Err(LeaseError::Expired { expired_at: lease.expires_at() }.into());
				}

				let max_expiry = lease.issued_at.saturating_add(self.limits.max_ttl);

				if now >= max_expiry {
					return Err(LeaseError::PastMaxTtl.into());
				}

				let op = RollbackOp::DeleteClient { id: id.to_owned() };

				if !self.journal.pending_for(&op).await?.is_empty() {
					return Err(LeaseError::RevocationPending { id: id.to_owned() }.into());
				}

				let increment = requested
					.filter(|d| d.is_positive())
					.unwrap_or(lease.ttl)
					.min(self.limits.renew_cap);
				let expires_at = now.saturating_add(increment).min(max_expiry);
				let mut renewed = secret.clone();

				renewed.lease.ttl = expires_at - now;
				renewed.lease.renewed_at = Some(now);

				tracing::debug!(
					client_id = id,
					ttl_secs = renewed.lease.ttl.whole_seconds(),
					"lease renewed"
				);

				Ok(renewed)
			})
			.await;

		obs::record_result(KIND, &result);

		result
	}

	/// Deletes the upstream client behind `secret` through the journal.
	pub async fn revoke(&self, secret: &LeasedSecret) -> Result<()> {
		const KIND: OpKind = OpKind::Revoke;

		let span = OpSpan::new(KIND, "revoke");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span
			.instrument(async move {
				let id = secret.credential_id()?;

				self.journal.rollback(&RollbackOp::DeleteClient { id: id.to_owned() }).await?;
				tracing::info!(client_id = id, "credential revoked");

				Ok(())
			})
			.await;

		obs::record_result(KIND, &result);

		result
	}

	/// Revokes a secret document handed back by the host.
	pub async fn revoke_raw(&self, raw: &[u8]) -> Result<()> {
		let secret = LeasedSecret::from_json(raw)?;

		self.revoke(&secret).await
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;
	use crate::{
		_preludet::*,
		config::{ConfigStore, Configuration},
		error::{CorruptionError, Error},
		secret::{ClientSecret, Credential, CredentialMetadata, Lease},
		store::{MemoryStore, Storage},
	};

	const ISSUED: OffsetDateTime = datetime!(2025-11-10 12:00 UTC);

	async fn manager(stub: &StubProvider) -> LeaseManager {
		manager_with_store(stub).await.0
	}

	async fn manager_with_store(stub: &StubProvider) -> (LeaseManager, Arc<MemoryStore>) {
		let backing = Arc::new(MemoryStore::default());
		let store: Arc<dyn Storage> = backing.clone();
		let config = ConfigStore::new(store.clone());

		config
			.write(&Configuration::new("http://admin", "https://public", "", ""))
			.await
			.expect("Configuration should be stored.");

		let manager = LeaseManager::new(
			RollbackJournal::new(store, config, Arc::new(stub.clone())),
			LeaseLimits::default(),
		);

		(manager, backing)
	}

	fn secret(id: &str, ttl: Duration) -> LeasedSecret {
		LeasedSecret::new(
			Credential {
				client_id: id.into(),
				client_secret: ClientSecret::new("s3cr3t"),
				url: "https://public".into(),
			},
			CredentialMetadata {
				role: "web".into(),
				display_name: "ops".into(),
				id: id.into(),
				is_managed: true,
			},
			Lease::new(ttl, ISSUED),
		)
	}

	#[tokio::test]
	async fn renewal_is_capped_at_one_hour() {
		let stub = StubProvider::default();
		let manager = manager(&stub).await;
		let now = ISSUED + Duration::minutes(30);
		let renewed = manager
			.renew_at(&secret("c1", Duration::hours(4)), Some(Duration::hours(6)), now)
			.await
			.expect("Renewal should succeed.");

		assert_eq!(renewed.lease.ttl, Duration::hours(1));
		assert_eq!(renewed.lease.renewed_at, Some(now));
		assert_eq!(renewed.lease.expires_at(), now + Duration::hours(1));

		let defaulted = manager
			.renew_at(&secret("c1", Duration::minutes(20)), None, now - Duration::minutes(15))
			.await
			.expect("Renewal without an increment should succeed.");

		assert_eq!(defaulted.lease.ttl, Duration::minutes(20));
		assert_eq!(stub.delete_calls(), 0);
	}

	#[tokio::test]
	async fn renewal_respects_max_ttl() {
		let stub = StubProvider::default();
		let manager = manager(&stub).await;
		let mut near_end = secret("c1", Duration::hours(1));

		near_end.lease.renewed_at = Some(ISSUED + Duration::hours(767));

		let renewed = manager
			.renew_at(&near_end, None, ISSUED + Duration::hours(767) + Duration::minutes(30))
			.await
			.expect("Renewal before the max TTL should succeed.");

		assert_eq!(renewed.lease.expires_at(), ISSUED + Duration::hours(768));

		let limited = LeaseManager::new(
			manager.journal.clone(),
			LeaseLimits::default().with_max_ttl(Duration::minutes(10)),
		);
		let err = limited
			.renew_at(&secret("c1", Duration::hours(1)), None, ISSUED + Duration::minutes(20))
			.await
			.expect_err("Renewal past the max TTL should fail.");

		assert!(matches!(err, Error::Lease(LeaseError::PastMaxTtl)));
	}

	#[tokio::test]
	async fn expired_or_fixed_leases_are_not_renewed() {
		let stub = StubProvider::default();
		let manager = manager(&stub).await;
		let err = manager
			.renew_at(&secret("c1", Duration::hours(1)), None, ISSUED + Duration::hours(2))
			.await
			.expect_err("Expired lease should not renew.");

		assert!(matches!(err, Error::Lease(LeaseError::Expired { .. })));
		assert!(err.user_message().is_some());

		let mut fixed = secret("c1", Duration::hours(1));

		fixed.lease.renewable = false;

		let err = manager.renew_at(&fixed, None, ISSUED).await.expect_err("Fixed lease fails.");

		assert!(matches!(err, Error::Lease(LeaseError::NotRenewable)));
	}

	#[tokio::test]
	async fn revoke_deletes_upstream_client() {
		let stub = StubProvider::default();
		let manager = manager(&stub).await;
		let id = stub.seed_client();

		manager.revoke(&secret(&id, Duration::hours(1))).await.expect("Revoke should succeed.");

		assert!(!stub.clients().contains(&id));
		assert!(manager.journal.pending().await.expect("Listing should succeed.").is_empty());

		manager
			.revoke(&secret(&id, Duration::hours(1)))
			.await
			.expect("Revoking an already deleted client should succeed.");
	}

	#[tokio::test]
	async fn failed_revoke_blocks_renewal_until_swept() {
		let stub = StubProvider::default();
		let manager = manager(&stub).await;
		let id = stub.seed_client();
		let leased = secret(&id, Duration::hours(1));

		stub.fail_deletes(true);
		manager.revoke(&leased).await.expect_err("Failing upstream should surface.");

		let err = manager
			.renew_at(&leased, None, ISSUED + Duration::minutes(10))
			.await
			.expect_err("Pending revocation should block renewal.");

		assert!(matches!(err, Error::Lease(LeaseError::RevocationPending { .. })));

		stub.fail_deletes(false);

		let report = manager
			.journal
			.sweep(OffsetDateTime::now_utc() + Duration::minutes(10))
			.await
			.expect("Sweep should run.");

		assert_eq!(report.cleared.len(), 1);
		assert!(!stub.clients().contains(&id));
	}

	#[tokio::test]
	async fn raw_secret_without_id_is_corruption() {
		let stub = StubProvider::default();
		let manager = manager(&stub).await;
		let mut value =
			serde_json::to_value(secret("c1", Duration::hours(1))).expect("Secret should encode.");

		value["internal"]["id"] = serde_json::json!("");

		let raw = serde_json::to_vec(&value).expect("Secret should re-encode.");
		let err = manager.revoke_raw(&raw).await.expect_err("Missing id should fail.");

		assert!(matches!(err, Error::Corruption(CorruptionError::MissingCredentialId)));
		assert!(manager.journal.pending().await.expect("Listing should succeed.").is_empty());
		assert_eq!(stub.delete_calls(), 0);
	}

	#[tokio::test]
	async fn huge_limits_and_ttls_saturate_instead_of_overflowing() {
		let stub = StubProvider::default();
		let manager = manager(&stub).await;
		let limits =
			LeaseLimits::default().with_max_ttl(Duration::MAX).with_renew_cap(Duration::MAX);

		assert_eq!(limits.max_ttl, LIMIT_CEILING);
		assert_eq!(limits.renew_cap, LIMIT_CEILING);

		let unbounded = LeaseManager::new(manager.journal.clone(), limits);
		let now = ISSUED + Duration::minutes(5);
		let renewed = unbounded
			.renew_at(&secret("c1", Duration::hours(1)), Some(Duration::MAX), now)
			.await
			.expect("Renewal with huge limits should succeed.");

		assert_eq!(renewed.lease.expires_at(), ISSUED + LIMIT_CEILING);

		let forever = secret("c2", Duration::MAX);

		assert!(!forever.lease.is_expired_at(now));

		let renewed = manager
			.renew_at(&forever, None, now)
			.await
			.expect("Renewal of a huge TTL should succeed.");

		assert_eq!(renewed.lease.ttl, DEFAULT_RENEW_CAP);
	}

	#[tokio::test]
	async fn repeated_failed_revokes_keep_one_entry() {
		let stub = StubProvider::default();
		let manager = manager(&stub).await;
		let id = stub.seed_client();
		let leased = secret(&id, Duration::hours(1));

		stub.fail_deletes(true);

		for _ in 0..5 {
			manager.revoke(&leased).await.expect_err("Failing upstream should surface.");
		}

		assert_eq!(manager.journal.pending().await.expect("Listing should succeed.").len(), 1);
		assert_eq!(stub.delete_calls(), 5);

		stub.fail_deletes(false);
		manager.revoke(&leased).await.expect("Revoke should succeed once upstream recovers.");

		assert!(manager.journal.pending().await.expect("Listing should succeed.").is_empty());
		assert!(!stub.clients().contains(&id));
	}

	#[tokio::test]
	async fn unreadable_journal_entry_does_not_block_other_renewals() {
		let stub = StubProvider::default();
		let (manager, backing) = manager_with_store(&stub).await;

		backing.put("wal/garbage", b"{not json".to_vec()).await.expect("Put should succeed.");

		let unrelated = secret("unrelated", Duration::hours(1));
		let renewed = manager
			.renew_at(&unrelated, None, ISSUED + Duration::minutes(5))
			.await
			.expect("Renewal should ignore the unreadable entry.");

		assert_eq!(renewed.lease.ttl, Duration::hours(1));
		assert!(
			backing.get("wal/garbage").await.expect("Get should succeed.").is_some(),
			"Unreadable entry must stay in place."
		);
	}
}

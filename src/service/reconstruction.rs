//! Historical snapshot reconstruction.
//!
//! The fleet platform only exposes today's unit count plus per-day
//! created/deleted totals. [`reconstruct_usage`] walks backwards from the
//! current count to recover each past day's total, and
//! [`SnapshotReconstructor`] persists the result as daily [`Snapshot`]s.
//!
//! The deactivated-unit count is only known for today and is applied
//! unchanged to every reconstructed day. Historical active counts are
//! therefore approximate for accounts whose deactivations changed inside
//! the window.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::charges::ChargeService;
use crate::domain::snapshot::check_units;
use crate::domain::{Account, AccountId, DailyDelta, Period, Snapshot, check_window};
use crate::error::BillingError;
use crate::persistence::BillingStore;

/// Reconstructs daily totals from the latest total and the daily deltas.
///
/// `days` must be ordered by date. The last day gets `current_usage`; each
/// earlier day is `later - created_later + deleted_later`, floored at zero.
/// The returned vector is aligned with `days`.
#[must_use]
pub fn reconstruct_usage(current_usage: i64, days: &[DailyDelta]) -> Vec<i64> {
    let mut usage = Vec::with_capacity(days.len());
    let mut later: Option<(i64, &DailyDelta)> = None;
    for day in days.iter().rev() {
        let value = match later {
            None => current_usage,
            Some((later_usage, later_day)) => later_usage
                .saturating_sub(later_day.created)
                .saturating_add(later_day.deleted)
                .max(0),
        };
        usage.push(value);
        later = Some((value, day));
    }
    usage.reverse();
    usage
}

/// Expands sparse deltas into one entry per day of `[from, to]`, treating
/// missing days as zero. Deltas outside the window are ignored and
/// duplicates for one day are summed.
#[must_use]
pub fn fill_window(from: NaiveDate, to: NaiveDate, deltas: &[DailyDelta]) -> Vec<DailyDelta> {
    let mut by_day: HashMap<NaiveDate, (i64, i64)> = HashMap::new();
    for delta in deltas.iter().filter(|d| d.date >= from && d.date <= to) {
        let entry = by_day.entry(delta.date).or_insert((0, 0));
        entry.0 = entry.0.saturating_add(delta.created);
        entry.1 = entry.1.saturating_add(delta.deleted);
    }
    from.iter_days()
        .take_while(|date| *date <= to)
        .map(|date| {
            let (created, deleted) = by_day.get(&date).copied().unwrap_or((0, 0));
            DailyDelta {
                date,
                created,
                deleted,
            }
        })
        .collect()
}

/// Supplier of raw unit figures for an account.
#[async_trait]
pub trait UsageSource: Send + Sync {
    /// Units on the account today.
    ///
    /// # Errors
    ///
    /// Returns a [`BillingError`] if the figure cannot be obtained.
    async fn current_unit_usage(&self, account: &Account) -> Result<i64, BillingError>;

    /// Units created and deleted per day within `[from, to]`. Days without
    /// activity may be omitted.
    ///
    /// # Errors
    ///
    /// Returns a [`BillingError`] if the deltas cannot be obtained.
    async fn daily_unit_deltas(
        &self,
        account: &Account,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyDelta>, BillingError>;

    /// Units currently deactivated on the account.
    ///
    /// # Errors
    ///
    /// Returns a [`BillingError`] if the figure cannot be obtained.
    async fn current_deactivated_count(&self, account: &Account) -> Result<i64, BillingError>;
}

/// Usage figures pushed by a caller for one account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountUsage {
    /// Units on the account today.
    pub current_units: i64,
    /// Units currently deactivated.
    pub deactivated_units: i64,
    /// Per-day created/deleted counts.
    pub deltas: Vec<DailyDelta>,
}

impl AccountUsage {
    /// Checks that every count is within `0..=MAX_UNITS`.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::InvalidRequest`] naming the first bad field.
    pub fn validate(&self) -> Result<(), BillingError> {
        check_units("current_units", self.current_units)?;
        check_units("deactivated_units", self.deactivated_units)?;
        self.deltas.iter().try_for_each(DailyDelta::validate)
    }
}

/// [`UsageSource`] over figures reported through the API, keyed by
/// account id.
#[derive(Debug, Clone, Default)]
pub struct ReportedUsage {
    accounts: HashMap<AccountId, AccountUsage>,
}

impl ReportedUsage {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the figures of one account.
    #[must_use]
    pub fn with_account(mut self, account_id: AccountId, usage: AccountUsage) -> Self {
        self.accounts.insert(account_id, usage);
        self
    }

    /// Accounts with reported figures, ordered by id.
    #[must_use]
    pub fn account_ids(&self) -> Vec<AccountId> {
        let mut ids: Vec<AccountId> = self.accounts.keys().copied().collect();
        ids.sort();
        ids
    }

    fn usage(&self, account: &Account) -> Result<&AccountUsage, BillingError> {
        self.accounts.get(&account.id).ok_or_else(|| {
            BillingError::InvalidRequest(format!("no usage reported for account {}", account.id))
        })
    }
}

#[async_trait]
impl UsageSource for ReportedUsage {
    async fn current_unit_usage(&self, account: &Account) -> Result<i64, BillingError> {
        Ok(self.usage(account)?.current_units)
    }

    async fn daily_unit_deltas(
        &self,
        account: &Account,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyDelta>, BillingError> {
        Ok(self
            .usage(account)?
            .deltas
            .iter()
            .filter(|d| d.date >= from && d.date <= to)
            .copied()
            .collect())
    }

    async fn current_deactivated_count(&self, account: &Account) -> Result<i64, BillingError> {
        Ok(self.usage(account)?.deactivated_units)
    }
}

/// Outcome of a reconstruction for one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountBackfill {
    /// Reconstructed account.
    pub account_id: AccountId,
    /// Snapshots written.
    pub snapshots: usize,
    /// Periods whose charges were recomputed.
    pub periods: Vec<Period>,
}

/// An account whose reconstruction failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackfillFailure {
    /// Failed account.
    pub account_id: AccountId,
    /// Error message.
    pub error: String,
}

/// Outcome of a multi-account reconstruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    /// First reconstructed day.
    pub from: NaiveDate,
    /// Last reconstructed day.
    pub to: NaiveDate,
    /// Accounts reconstructed successfully.
    pub completed: Vec<AccountBackfill>,
    /// Accounts that failed; the others were still processed.
    pub failed: Vec<BackfillFailure>,
}

/// Rebuilds and stores daily snapshots, then refreshes the affected
/// periods' charges.
#[derive(Debug, Clone)]
pub struct SnapshotReconstructor {
    store: Arc<dyn BillingStore>,
    charges: ChargeService,
}

impl SnapshotReconstructor {
    /// Creates a reconstructor writing to `store`.
    #[must_use]
    pub fn new(store: Arc<dyn BillingStore>, charges: ChargeService) -> Self {
        Self { store, charges }
    }

    /// Reconstructs `[from, to]` for one account, `to` being the day
    /// `current_unit_usage` describes. Re-running over an overlapping
    /// range overwrites the earlier snapshots.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::InvalidRequest`] for a reversed or over-long window,
    /// [`BillingError::AccountNotFound`] for an unknown account, or any
    /// error from the usage source or the store.
    pub async fn backfill_account(
        &self,
        source: &dyn UsageSource,
        account_id: AccountId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<AccountBackfill, BillingError> {
        check_window("backfill window", from, to)?;
        let account = self.store.get_account(account_id).await?;

        let current = source.current_unit_usage(&account).await?;
        let deactivated = source.current_deactivated_count(&account).await?;
        let deltas = source.daily_unit_deltas(&account, from, to).await?;
        let figures = AccountUsage {
            current_units: current,
            deactivated_units: deactivated,
            deltas,
        };
        figures.validate()?;

        let days = fill_window(from, to, &figures.deltas);
        let usage = reconstruct_usage(current, &days);
        let snapshots: Vec<Snapshot> = days
            .iter()
            .zip(usage)
            .map(|(day, total_units)| Snapshot {
                account_id,
                date: day.date,
                total_units,
                units_created: day.created,
                units_deleted: day.deleted,
                units_deactivated: deactivated,
            })
            .collect();
        snapshots.iter().try_for_each(Snapshot::validate)?;
        self.store.upsert_snapshots(&snapshots).await?;

        let periods: BTreeSet<Period> = days.iter().map(|d| Period::containing(d.date)).collect();
        for period in &periods {
            self.charges.recompute_period(account_id, *period).await?;
        }

        tracing::info!(
            %account_id,
            %from,
            %to,
            current,
            deactivated,
            snapshots = snapshots.len(),
            "snapshots reconstructed"
        );
        Ok(AccountBackfill {
            account_id,
            snapshots: snapshots.len(),
            periods: periods.into_iter().collect(),
        })
    }

    /// Reconstructs `[from, to]` for each listed account in turn. A failing
    /// account is logged and reported; the rest are still processed.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::InvalidRequest`] for a reversed or over-long window.
    pub async fn backfill_accounts(
        &self,
        source: &dyn UsageSource,
        account_ids: &[AccountId],
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<BackfillReport, BillingError> {
        check_window("backfill window", from, to)?;
        let mut report = BackfillReport {
            from,
            to,
            completed: Vec::new(),
            failed: Vec::new(),
        };
        for &account_id in account_ids {
            match self.backfill_account(source, account_id, from, to).await {
                Ok(done) => report.completed.push(done),
                Err(e) => {
                    tracing::warn!(%account_id, error = %e, "snapshot reconstruction failed");
                    report.failed.push(BackfillFailure {
                        account_id,
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }

    /// Reconstructs `[from, to]` for every billing-enabled account.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::InvalidRequest`] for a reversed or over-long window, or a
    /// persistence error if the accounts cannot be listed.
    pub async fn backfill_all(
        &self,
        source: &dyn UsageSource,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<BackfillReport, BillingError> {
        check_window("backfill window", from, to)?;
        let ids: Vec<AccountId> = self
            .store
            .list_billing_enabled_accounts()
            .await?
            .iter()
            .map(|a| a.id)
            .collect();
        self.backfill_accounts(source, &ids, from, to).await
    }

    /// Deletes every stored snapshot ahead of a full re-reconstruction.
    /// Charges are left alone until the next backfill recomputes them.
    ///
    /// # Errors
    ///
    /// Returns a persistence error from the store.
    pub async fn clear_snapshots(&self) -> Result<u64, BillingError> {
        let removed = self.store.clear_snapshots().await?;
        tracing::warn!(removed, "all snapshots cleared");
        Ok(removed)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;
    use crate::service::test_support::{date, seed_account};

    fn delta(d: NaiveDate, created: i64, deleted: i64) -> DailyDelta {
        DailyDelta {
            date: d,
            created,
            deleted,
        }
    }

    #[test]
    fn previous_day_undoes_todays_deltas() {
        let days = [delta(date(2025, 3, 9), 0, 0), delta(date(2025, 3, 10), 5, 2)];
        assert_eq!(reconstruct_usage(50, &days), vec![47, 50]);
    }

    #[test]
    fn single_day_takes_current_usage() {
        assert_eq!(reconstruct_usage(12, &[delta(date(2025, 3, 1), 4, 4)]), vec![12]);
        assert!(reconstruct_usage(12, &[]).is_empty());
    }

    #[test]
    fn inconsistent_deltas_floor_at_zero() {
        let days = [
            delta(date(2025, 3, 1), 0, 0),
            delta(date(2025, 3, 2), 0, 0),
            delta(date(2025, 3, 3), 10, 0),
        ];
        // 3 - 10 would go negative; the floor then propagates backwards.
        assert_eq!(reconstruct_usage(3, &days), vec![0, 0, 3]);
    }

    #[test]
    fn recurrence_holds_on_every_interior_day() {
        let deltas: Vec<DailyDelta> = date(2025, 1, 1)
            .iter_days()
            .take(60)
            .enumerate()
            .map(|(i, d)| {
                let i = i as i64;
                delta(d, (i * 7) % 5, (i * 3) % 4)
            })
            .collect();
        let usage = reconstruct_usage(40, &deltas);
        assert_eq!(usage.last(), Some(&40));
        for ((today, later), later_day) in usage.iter().zip(usage.iter().skip(1)).zip(deltas.iter().skip(1)) {
            let expected = (later - later_day.created + later_day.deleted).max(0);
            assert_eq!(*today, expected);
        }
    }

    #[test]
    fn fill_window_zeroes_missing_days_and_drops_outsiders() {
        let filled = fill_window(
            date(2025, 3, 1),
            date(2025, 3, 3),
            &[
                delta(date(2025, 2, 28), 9, 9),
                delta(date(2025, 3, 2), 1, 0),
                delta(date(2025, 3, 2), 2, 1),
            ],
        );
        assert_eq!(
            filled,
            vec![
                delta(date(2025, 3, 1), 0, 0),
                delta(date(2025, 3, 2), 3, 1),
                delta(date(2025, 3, 3), 0, 0),
            ]
        );
    }

    #[tokio::test]
    async fn backfill_is_idempotent_and_keeps_deactivated_constant() {
        let store: Arc<dyn BillingStore> = Arc::new(MemoryStore::new());
        let account = seed_account(&store, 1, "KZT").await;
        let reconstructor = SnapshotReconstructor::new(
            Arc::clone(&store),
            ChargeService::new(Arc::clone(&store)),
        );
        let source = ReportedUsage::new().with_account(
            account.id,
            AccountUsage {
                current_units: 50,
                deactivated_units: 4,
                deltas: vec![delta(date(2025, 3, 10), 5, 2)],
            },
        );

        for _ in 0..2 {
            let Ok(done) = reconstructor
                .backfill_account(&source, account.id, date(2025, 3, 8), date(2025, 3, 10))
                .await
            else {
                panic!("backfill failed");
            };
            assert_eq!(done.snapshots, 3);
        }

        let Ok(stored) = store
            .snapshots_between(account.id, date(2025, 3, 1), date(2025, 3, 31))
            .await
        else {
            panic!("query failed");
        };
        let totals: Vec<i64> = stored.iter().map(|s| s.total_units).collect();
        assert_eq!(totals, vec![47, 47, 50]);
        assert!(stored.iter().all(|s| s.units_deactivated == 4));
    }

    #[tokio::test]
    async fn reversed_window_is_rejected() {
        let store: Arc<dyn BillingStore> = Arc::new(MemoryStore::new());
        let reconstructor = SnapshotReconstructor::new(
            Arc::clone(&store),
            ChargeService::new(Arc::clone(&store)),
        );
        let result = reconstructor
            .backfill_all(&ReportedUsage::new(), date(2025, 3, 2), date(2025, 3, 1))
            .await;
        assert!(matches!(result, Err(BillingError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn unreported_account_fails_without_stopping_the_batch() {
        let store: Arc<dyn BillingStore> = Arc::new(MemoryStore::new());
        let reported = seed_account(&store, 1, "KZT").await;
        let silent = seed_account(&store, 2, "KZT").await;
        let reconstructor = SnapshotReconstructor::new(
            Arc::clone(&store),
            ChargeService::new(Arc::clone(&store)),
        );
        let source = ReportedUsage::new().with_account(
            reported.id,
            AccountUsage {
                current_units: 3,
                ..AccountUsage::default()
            },
        );

        let Ok(report) = reconstructor
            .backfill_all(&source, date(2025, 3, 1), date(2025, 3, 2))
            .await
        else {
            panic!("batch failed");
        };
        assert_eq!(report.completed.len(), 1);
        assert_eq!(report.failed.first().map(|f| f.account_id), Some(silent.id));
    }

    #[tokio::test]
    async fn negative_reported_counts_are_rejected_before_storing() {
        let store: Arc<dyn BillingStore> = Arc::new(MemoryStore::new());
        let account = seed_account(&store, 1, "KZT").await;
        let reconstructor = SnapshotReconstructor::new(
            Arc::clone(&store),
            ChargeService::new(Arc::clone(&store)),
        );
        let bad_figures = [
            AccountUsage {
                current_units: 10,
                deactivated_units: -90,
                deltas: Vec::new(),
            },
            AccountUsage {
                current_units: 10,
                deactivated_units: 0,
                deltas: vec![delta(date(2025, 3, 2), -5, 0)],
            },
        ];
        for usage in bad_figures {
            assert!(matches!(usage.validate(), Err(BillingError::InvalidRequest(_))));
            let source = ReportedUsage::new().with_account(account.id, usage);
            let result = reconstructor
                .backfill_account(&source, account.id, date(2025, 3, 1), date(2025, 3, 2))
                .await;
            assert!(matches!(result, Err(BillingError::InvalidRequest(_))));
        }

        let Ok(stored) = store
            .snapshots_between(account.id, date(2025, 3, 1), date(2025, 3, 31))
            .await
        else {
            panic!("query failed");
        };
        assert!(stored.is_empty());
    }

    #[tokio::test]
    async fn window_longer_than_a_year_is_rejected() {
        let store: Arc<dyn BillingStore> = Arc::new(MemoryStore::new());
        let account = seed_account(&store, 1, "KZT").await;
        let reconstructor = SnapshotReconstructor::new(
            Arc::clone(&store),
            ChargeService::new(Arc::clone(&store)),
        );
        let source = ReportedUsage::new().with_account(account.id, AccountUsage::default());
        let result = reconstructor
            .backfill_account(&source, account.id, NaiveDate::MIN, NaiveDate::MAX)
            .await;
        assert!(matches!(result, Err(BillingError::InvalidRequest(_))));
    }
}

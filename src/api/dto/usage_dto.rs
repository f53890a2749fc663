//! Snapshot ingestion, reconstruction and daily charge DTOs.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::PeriodParams;
use crate::domain::{AccountId, DailyCharge, DailyDelta, Snapshot};
use crate::service::{AccountUsage, ChargeReport, CurrencyTotal, ModuleChargeSummary, ReportedUsage};

/// Request body for `POST /snapshots`: one live day of usage.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RecordSnapshotRequest {
    /// Account the figures belong to.
    pub account_id: i64,
    /// Day described.
    pub date: NaiveDate,
    /// Units on the account that day.
    pub total_units: i64,
    /// Units added that day.
    #[serde(default)]
    pub units_created: i64,
    /// Units removed that day.
    #[serde(default)]
    pub units_deleted: i64,
    /// Units deactivated that day.
    #[serde(default)]
    pub units_deactivated: i64,
}

impl From<RecordSnapshotRequest> for Snapshot {
    fn from(req: RecordSnapshotRequest) -> Self {
        Self {
            account_id: AccountId::new(req.account_id),
            date: req.date,
            total_units: req.total_units,
            units_created: req.units_created,
            units_deleted: req.units_deleted,
            units_deactivated: req.units_deactivated,
        }
    }
}

/// Created/deleted counts of one day.
#[derive(Debug, Deserialize, ToSchema)]
pub struct DailyDeltaDto {
    /// Day.
    pub date: NaiveDate,
    /// Units created.
    #[serde(default)]
    pub created: i64,
    /// Units deleted.
    #[serde(default)]
    pub deleted: i64,
}

/// Usage figures of one account as reported by the fleet platform.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AccountUsageDto {
    /// Account id.
    pub account_id: i64,
    /// Units on the account on the last day of the window.
    pub current_units: i64,
    /// Units currently deactivated.
    #[serde(default)]
    pub deactivated_units: i64,
    /// Per-day created/deleted counts. Missing days count as zero.
    #[serde(default)]
    pub deltas: Vec<DailyDeltaDto>,
}

/// Request body for `POST /snapshots/backfill`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct BackfillRequest {
    /// First day to reconstruct.
    pub from: NaiveDate,
    /// Last day to reconstruct, the day `current_units` describes.
    pub to: NaiveDate,
    /// Figures per account.
    pub accounts: Vec<AccountUsageDto>,
}

impl BackfillRequest {
    /// Converts the payload into a usage source.
    #[must_use]
    pub fn usage(self) -> ReportedUsage {
        self.accounts
            .into_iter()
            .fold(ReportedUsage::new(), |usage, account| {
                let deltas = account
                    .deltas
                    .into_iter()
                    .map(|d| DailyDelta {
                        date: d.date,
                        created: d.created,
                        deleted: d.deleted,
                    })
                    .collect();
                usage.with_account(
                    AccountId::new(account.account_id),
                    AccountUsage {
                        current_units: account.current_units,
                        deactivated_units: account.deactivated_units,
                        deltas,
                    },
                )
            })
    }
}

/// Charge of one module on one day.
#[derive(Debug, Serialize, ToSchema)]
pub struct DailyChargeDto {
    /// Day charged.
    pub date: NaiveDate,
    /// Module id.
    pub module_id: i64,
    /// Module name.
    pub module_name: String,
    /// Pricing model.
    pub pricing_kind: String,
    /// Module price.
    #[schema(value_type = String)]
    pub unit_price: Decimal,
    /// Price currency.
    pub currency: String,
    /// Active units that day.
    pub active_units: i64,
    /// Days in the month of `date`.
    pub days_in_month: u32,
    /// Unrounded cost of the day.
    #[schema(value_type = String)]
    pub daily_cost: Decimal,
}

impl From<DailyCharge> for DailyChargeDto {
    fn from(charge: DailyCharge) -> Self {
        Self {
            date: charge.date,
            module_id: charge.module_id.get(),
            module_name: charge.module_name,
            pricing_kind: charge.pricing_kind.to_string(),
            unit_price: charge.unit_price,
            currency: charge.currency.to_string(),
            active_units: charge.active_units,
            days_in_month: charge.days_in_month,
            daily_cost: charge.daily_cost,
        }
    }
}

/// Response of `POST /snapshots`.
#[derive(Debug, Serialize, ToSchema)]
pub struct RecordSnapshotResponse {
    /// Account id.
    pub account_id: i64,
    /// Day recorded.
    pub date: NaiveDate,
    /// Active units derived from the snapshot.
    pub active_units: i64,
    /// Charges computed for the day.
    pub charges: Vec<DailyChargeDto>,
}

/// Month-to-date totals of one module.
#[derive(Debug, Serialize, ToSchema)]
pub struct ModuleChargeSummaryDto {
    /// Module id.
    pub module_id: i64,
    /// Module name.
    pub module_name: String,
    /// Pricing model.
    pub pricing_kind: String,
    /// Currency of the totals.
    pub currency: String,
    /// Days with a charge.
    pub days_charged: u32,
    /// Mean active units over the charged days.
    #[schema(value_type = String)]
    pub average_units: Decimal,
    /// Rounded total.
    #[schema(value_type = String)]
    pub total: Decimal,
}

impl From<ModuleChargeSummary> for ModuleChargeSummaryDto {
    fn from(summary: ModuleChargeSummary) -> Self {
        Self {
            module_id: summary.module_id.get(),
            module_name: summary.module_name,
            pricing_kind: summary.pricing_kind.to_string(),
            currency: summary.currency.to_string(),
            days_charged: summary.days_charged,
            average_units: summary.average_units,
            total: summary.total,
        }
    }
}

/// Rounded total in one currency.
#[derive(Debug, Serialize, ToSchema)]
pub struct CurrencyTotalDto {
    /// Currency.
    pub currency: String,
    /// Total.
    #[schema(value_type = String)]
    pub total: Decimal,
}

impl From<CurrencyTotal> for CurrencyTotalDto {
    fn from(total: CurrencyTotal) -> Self {
        Self {
            currency: total.currency.to_string(),
            total: total.total,
        }
    }
}

/// Response of `GET /accounts/{id}/charges`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ChargeReportDto {
    /// Account id.
    pub account_id: i64,
    /// Reported month.
    pub period: PeriodParams,
    /// Daily rows ordered by date then module.
    pub charges: Vec<DailyChargeDto>,
    /// Per-module totals.
    pub modules: Vec<ModuleChargeSummaryDto>,
    /// Per-currency totals.
    pub totals: Vec<CurrencyTotalDto>,
}

impl From<ChargeReport> for ChargeReportDto {
    fn from(report: ChargeReport) -> Self {
        Self {
            account_id: report.account_id.get(),
            period: report.period.into(),
            charges: report.charges.into_iter().map(Into::into).collect(),
            modules: report.modules.into_iter().map(Into::into).collect(),
            totals: report.totals.into_iter().map(Into::into).collect(),
        }
    }
}

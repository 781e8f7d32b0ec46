//! Commission calculation engine.
//!
//! Converts a trainer's validated sessions in one calendar month into a
//! commission amount under one of four methods, with a per-tier breakdown
//! the trainer can reconcile against the total. Tier-bracket determination
//! and every dollar figure use the same validated-session subset - never a
//! count from one filter and a value from another, a classic source of
//! count/value discrepancies in payout reports.

use crate::{
    core::TenantContext,
    entities::{Session, session},
    errors::{Error, Result},
};
use chrono::{TimeZone, Utc};
use sea_orm::prelude::*;
use serde::{Deserialize, Serialize};

/// One commission rate bracket over a range of session counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionTier {
    /// First session count in the bracket (1-based ordinals)
    pub min_sessions: i64,
    /// Last session count in the bracket; `None` means unbounded
    pub max_sessions: Option<i64>,
    /// Commission percentage for the bracket, as a fraction in `[0, 1]`
    pub percentage: f64,
    /// Per-session flat fee; when set, the bracket is flat-fee typed and the
    /// percentage is ignored for graduated math
    pub flat_fee: Option<f64>,
}

impl CommissionTier {
    /// Whether the bracket contains the given session count.
    #[must_use]
    pub fn contains(&self, sessions: i64) -> bool {
        sessions >= self.min_sessions && self.max_sessions.is_none_or(|max| sessions <= max)
    }
}

/// An ordered, non-overlapping, gap-free partition of the session-count
/// axis. Structural validation happens at construction, so a malformed
/// table is rejected before any commission run can silently misprice.
#[derive(Debug, Clone, PartialEq)]
pub struct TierTable {
    tiers: Vec<CommissionTier>,
}

impl TierTable {
    /// Builds a validated tier table.
    ///
    /// # Errors
    /// Returns `InvalidTierTable` when the table is empty, does not start at
    /// session 0 or 1, has a gap or overlap between consecutive brackets,
    /// does not end in exactly one unbounded bracket, or carries a
    /// percentage outside `[0, 1]` or a negative flat fee.
    pub fn new(mut tiers: Vec<CommissionTier>) -> Result<Self> {
        if tiers.is_empty() {
            return Err(Error::InvalidTierTable {
                message: "tier table is empty".to_string(),
            });
        }

        tiers.sort_by_key(|tier| tier.min_sessions);

        if tiers[0].min_sessions > 1 || tiers[0].min_sessions < 0 {
            return Err(Error::InvalidTierTable {
                message: format!(
                    "first tier must start at session 0 or 1, got {}",
                    tiers[0].min_sessions
                ),
            });
        }

        for (index, tier) in tiers.iter().enumerate() {
            if !tier.percentage.is_finite() || !(0.0..=1.0).contains(&tier.percentage) {
                return Err(Error::InvalidTierTable {
                    message: format!(
                        "tier starting at {} has percentage {} outside [0, 1]",
                        tier.min_sessions, tier.percentage
                    ),
                });
            }
            if let Some(fee) = tier.flat_fee {
                if !fee.is_finite() || fee < 0.0 {
                    return Err(Error::InvalidTierTable {
                        message: format!(
                            "tier starting at {} has invalid flat fee {fee}",
                            tier.min_sessions
                        ),
                    });
                }
            }

            match tier.max_sessions {
                Some(max) => {
                    if max < tier.min_sessions {
                        return Err(Error::InvalidTierTable {
                            message: format!("tier [{}-{max}] is an empty range", tier.min_sessions),
                        });
                    }
                    let Some(next) = tiers.get(index + 1) else {
                        return Err(Error::InvalidTierTable {
                            message: format!(
                                "last tier [{}-{max}] must be unbounded",
                                tier.min_sessions
                            ),
                        });
                    };
                    if next.min_sessions != max + 1 {
                        return Err(Error::InvalidTierTable {
                            message: format!(
                                "tiers are not gap-free: [{}-{max}] is followed by one starting at {}",
                                tier.min_sessions, next.min_sessions
                            ),
                        });
                    }
                }
                None => {
                    if index != tiers.len() - 1 {
                        return Err(Error::InvalidTierTable {
                            message: format!(
                                "unbounded tier starting at {} must be last",
                                tier.min_sessions
                            ),
                        });
                    }
                }
            }
        }

        Ok(Self { tiers })
    }

    /// Finds the single tier containing the given session count. Tables are
    /// gap-free, so `None` only happens for counts below the first bracket.
    #[must_use]
    pub fn tier_for(&self, sessions: i64) -> Option<&CommissionTier> {
        self.tiers.iter().find(|tier| tier.contains(sessions))
    }

    /// The validated brackets, ascending.
    #[must_use]
    pub fn tiers(&self) -> &[CommissionTier] {
        &self.tiers
    }
}

/// How a trainer's commission is computed. A closed union: the compiler,
/// not a runtime audit script, rejects a method without its required
/// parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum CommissionMethod {
    /// Fixed dollar amount per validated session
    FlatFee {
        /// Dollars per validated session
        fee_per_session: f64,
    },
    /// Flat percentage of validated-session value
    Percentage {
        /// Fraction in `[0, 1]`
        rate: f64,
    },
    /// The achieved bracket's rate applies to everything in the period
    Progressive {
        /// Validated rate brackets
        tiers: TierTable,
    },
    /// Each bracket's rate applies only to the sessions inside it
    /// (tax-bracket style)
    Graduated {
        /// Validated rate brackets
        tiers: TierTable,
    },
}

/// Calendar month a commission run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    /// Calendar year
    pub year: i32,
    /// Month, 1-12
    pub month: u32,
}

impl Period {
    /// Creates a period, rejecting out-of-range months.
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if (1..=12).contains(&month) {
            Ok(Self { year, month })
        } else {
            Err(Error::Config {
                message: format!("month must be 1-12, got {month}"),
            })
        }
    }

    /// Half-open UTC bounds `[start of month, start of next month)`.
    pub(crate) fn bounds(self) -> Result<(DateTimeUtc, DateTimeUtc)> {
        let start = Utc
            .with_ymd_and_hms(self.year, self.month, 1, 0, 0, 0)
            .single()
            .ok_or(Error::Config {
                message: format!("invalid period {}-{:02}", self.year, self.month),
            })?;
        let (next_year, next_month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        let end = Utc
            .with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0)
            .single()
            .ok_or(Error::Config {
                message: format!("invalid period {next_year}-{next_month:02}"),
            })?;
        Ok((start, end))
    }
}

/// One bracket's contribution to a graduated commission; the rows of the
/// explanation the trainer sees.
#[derive(Debug, Clone, PartialEq)]
pub struct BracketCommission {
    /// The bracket
    pub tier: CommissionTier,
    /// Validated sessions falling inside the bracket
    pub sessions: i64,
    /// Dollar value attributed to the bracket
    pub value: f64,
    /// Commission earned in the bracket
    pub commission: f64,
}

/// Outcome of applying a commission method to period aggregates.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodOutcome {
    /// Effective commission rate
    pub commission_rate: f64,
    /// Commission owed in dollars
    pub commission_amount: f64,
    /// The bracket reached, for progressive methods
    pub tier_achieved: Option<CommissionTier>,
    /// Per-bracket breakdown, for graduated methods
    pub tiers_applied: Vec<BracketCommission>,
}

/// A trainer's computed commission for one period. A derived projection over
/// sessions and the tier table - never persisted as source of truth.
#[derive(Debug, Clone)]
pub struct TrainerCommission {
    /// The trainer
    pub trainer_id: i64,
    /// The calendar month covered
    pub period: Period,
    /// All non-cancelled sessions in the period (pending included, for UI)
    pub total_sessions: usize,
    /// The validated subset that money math runs on
    pub validated_sessions: usize,
    /// Dollar value of the validated subset
    pub total_value: f64,
    /// Effective commission rate
    pub commission_rate: f64,
    /// Commission owed in dollars
    pub commission_amount: f64,
    /// The bracket reached, for progressive methods
    pub tier_achieved: Option<CommissionTier>,
    /// Per-bracket breakdown, for graduated methods; reconciles exactly to
    /// `commission_amount`
    pub tiers_applied: Vec<BracketCommission>,
}

/// Applies a commission method to period aggregates.
///
/// Zero validated sessions is the expected empty case for every method:
/// commission 0, no tier lookup, no division.
///
/// # Errors
/// Returns `NoTierMatch` when a tiered method finds no bracket for the
/// session count - a configuration defect surfaced loudly rather than
/// defaulting to a 0% rate.
#[allow(clippy::cast_precision_loss)]
pub fn apply_method(
    method: &CommissionMethod,
    validated_sessions: i64,
    total_value: f64,
) -> Result<MethodOutcome> {
    if validated_sessions <= 0 {
        return Ok(MethodOutcome {
            commission_rate: 0.0,
            commission_amount: 0.0,
            tier_achieved: None,
            tiers_applied: Vec::new(),
        });
    }

    match method {
        CommissionMethod::FlatFee { fee_per_session } => Ok(MethodOutcome {
            commission_rate: 0.0,
            commission_amount: validated_sessions as f64 * fee_per_session,
            tier_achieved: None,
            tiers_applied: Vec::new(),
        }),
        CommissionMethod::Percentage { rate } => Ok(MethodOutcome {
            commission_rate: *rate,
            commission_amount: total_value * rate,
            tier_achieved: None,
            tiers_applied: Vec::new(),
        }),
        CommissionMethod::Progressive { tiers } => {
            let tier = tiers
                .tier_for(validated_sessions)
                .ok_or(Error::NoTierMatch {
                    sessions: validated_sessions,
                })?;
            Ok(MethodOutcome {
                commission_rate: tier.percentage,
                commission_amount: total_value * tier.percentage,
                tier_achieved: Some(tier.clone()),
                tiers_applied: Vec::new(),
            })
        }
        CommissionMethod::Graduated { tiers } => {
            let average_session_value = total_value / validated_sessions as f64;
            let mut tiers_applied = Vec::new();
            let mut commission_amount = 0.0;

            for tier in tiers.tiers() {
                // Session ordinals are 1-based, so a bracket declared from 0
                // prices the same as one declared from 1
                let lower = tier.min_sessions.max(1);
                let upper = tier
                    .max_sessions
                    .map_or(validated_sessions, |max| max.min(validated_sessions));
                let sessions_in_bracket = (upper - lower + 1).max(0);
                if sessions_in_bracket == 0 {
                    continue;
                }

                let value = sessions_in_bracket as f64 * average_session_value;
                let commission = tier.flat_fee.map_or_else(
                    || value * tier.percentage,
                    |fee| sessions_in_bracket as f64 * fee,
                );
                commission_amount += commission;
                tiers_applied.push(BracketCommission {
                    tier: tier.clone(),
                    sessions: sessions_in_bracket,
                    value,
                    commission,
                });
            }

            let commission_rate = if total_value > 0.0 {
                commission_amount / total_value
            } else {
                0.0
            };
            Ok(MethodOutcome {
                commission_rate,
                commission_amount,
                tier_achieved: None,
                tiers_applied,
            })
        }
    }
}

/// Computes a trainer's commission for one calendar month.
///
/// Aggregates the trainer's non-cancelled sessions in the period;
/// `total_sessions` counts pending sessions too (so a UI can show work
/// awaiting confirmation), while the bracket determination and every dollar
/// figure run on the validated subset only.
pub async fn compute_commission(
    db: &DatabaseConnection,
    ctx: &TenantContext,
    trainer_id: i64,
    period: Period,
    method: &CommissionMethod,
) -> Result<TrainerCommission> {
    let (start, end) = period.bounds()?;

    let sessions = Session::find()
        .filter(session::Column::OrganizationId.eq(ctx.organization_id))
        .filter(session::Column::TrainerId.eq(trainer_id))
        .filter(session::Column::Cancelled.eq(false))
        .filter(session::Column::SessionDate.gte(start))
        .filter(session::Column::SessionDate.lt(end))
        .all(db)
        .await?;

    // One subset drives both the count and the value
    let validated: Vec<&session::Model> = sessions.iter().filter(|s| s.validated).collect();
    let validated_sessions = validated.len();
    let total_value: f64 = validated.iter().map(|s| s.session_value).sum();

    let outcome = apply_method(method, i64::try_from(validated_sessions)?, total_value)?;

    Ok(TrainerCommission {
        trainer_id,
        period,
        total_sessions: sessions.len(),
        validated_sessions,
        total_value,
        commission_rate: outcome.commission_rate,
        commission_amount: outcome.commission_amount,
        tier_achieved: outcome.tier_achieved,
        tiers_applied: outcome.tiers_applied,
    })
}

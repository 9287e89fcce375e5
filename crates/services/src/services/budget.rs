//! AI spend tracking and the budget gate in front of every provider request.

use chrono::{Datelike, NaiveDate, Utc};
use db::models::generation::{GenerationBudget, GenerationCost, UpdateGenerationBudget};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, warn};
use ts_rs::TS;

use super::{ai_provider::TokenUsage, pricing};

#[derive(Debug, Error)]
pub enum BudgetError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{scope} AI budget exhausted: spent ${spent:.4} of ${limit:.2}")]
    Exceeded {
        scope: &'static str,
        spent: f64,
        limit: f64,
    },
    #[error("invalid budget: {0}")]
    Invalid(String),
}

/// Budget settings with current spend
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct BudgetStatus {
    pub daily_budget: f64,
    pub monthly_budget: f64,
    pub enforce: bool,
    pub today_spend: f64,
    pub month_spend: f64,
    pub daily_remaining: f64,
    pub monthly_remaining: f64,
    pub exceeded: bool,
}

pub struct BudgetService;

impl BudgetService {
    pub fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    pub async fn status(pool: &SqlitePool, today: NaiveDate) -> Result<BudgetStatus, BudgetError> {
        let budget = GenerationBudget::get(pool).await?;
        let today_spend = GenerationCost::total_for_day(pool, today).await?;
        let month_spend = GenerationCost::total_between(pool, first_of_month(today), today).await?;

        Ok(BudgetStatus {
            daily_budget: budget.daily_budget,
            monthly_budget: budget.monthly_budget,
            enforce: budget.enforce,
            today_spend,
            month_spend,
            daily_remaining: (budget.daily_budget - today_spend).max(0.0),
            monthly_remaining: (budget.monthly_budget - month_spend).max(0.0),
            exceeded: today_spend >= budget.daily_budget || month_spend >= budget.monthly_budget,
        })
    }

    /// Reject when enforcement is on and either the daily or the monthly limit is reached
    pub async fn check(pool: &SqlitePool, today: NaiveDate) -> Result<(), BudgetError> {
        let status = Self::status(pool, today).await?;
        if !status.enforce {
            if status.exceeded {
                debug!(
                    today_spend = status.today_spend,
                    month_spend = status.month_spend,
                    "AI budget exceeded but not enforced"
                );
            }
            return Ok(());
        }

        if status.today_spend >= status.daily_budget {
            warn!(spent = status.today_spend, limit = status.daily_budget, "Daily AI budget exhausted");
            return Err(BudgetError::Exceeded {
                scope: "daily",
                spent: status.today_spend,
                limit: status.daily_budget,
            });
        }
        if status.month_spend >= status.monthly_budget {
            warn!(spent = status.month_spend, limit = status.monthly_budget, "Monthly AI budget exhausted");
            return Err(BudgetError::Exceeded {
                scope: "monthly",
                spent: status.month_spend,
                limit: status.monthly_budget,
            });
        }
        Ok(())
    }

    /// Price the usage and add it to the day's totals. Returns the cost in USD.
    pub async fn record_usage(
        pool: &SqlitePool,
        today: NaiveDate,
        model: &str,
        usage: TokenUsage,
    ) -> Result<f64, BudgetError> {
        let cost = pricing::estimate_cost(model, usage);
        GenerationCost::record(
            pool,
            today,
            usage.input_tokens as i64,
            usage.output_tokens as i64,
            cost,
        )
        .await?;
        Ok(cost)
    }

    pub async fn update(
        pool: &SqlitePool,
        data: &UpdateGenerationBudget,
    ) -> Result<GenerationBudget, BudgetError> {
        for (name, value) in [("daily_budget", data.daily_budget), ("monthly_budget", data.monthly_budget)] {
            if let Some(value) = value {
                if !value.is_finite() || value < 0.0 {
                    return Err(BudgetError::Invalid(format!("{name} must be a non-negative number")));
                }
            }
        }
        Ok(GenerationBudget::update(pool, data).await?)
    }

    pub async fn recent_costs(
        pool: &SqlitePool,
        today: NaiveDate,
        days: u32,
    ) -> Result<Vec<GenerationCost>, BudgetError> {
        let from = today - chrono::Duration::days(days.saturating_sub(1) as i64);
        Ok(GenerationCost::find_since(pool, from).await?)
    }
}

fn first_of_month(day: NaiveDate) -> NaiveDate {
    day.with_day(1).unwrap_or(day)
}

//! Descriptive fleet aggregates over a normalized lease table.

use crate::error::Result;
use crate::types::columns;
use crate::utils::{f64_values, i64_values, optional_f64_values, optional_i64_values, optional_string_values, string_values};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M",
];
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];

// Column names of the typed frame the aggregates run on
const MAKE: &str = "make";
const MODEL: &str = "model";
const CONDITION: &str = "condition";
const STATE: &str = "state";
const ZIP: &str = "zip";
const YEAR: &str = "year";
const INVOICED: &str = "invoiced";
const WEEKLY: &str = "weekly";
const PAYBACK: &str = "payback";
const BUY_YEAR: &str = "buy_year";
const BUY_MONTH: &str = "buy_month";
const COUNT: &str = "count";
const MEAN: &str = "mean";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub value: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MakeModelCount {
    pub make: String,
    pub model: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionPayback {
    pub condition: String,
    pub count: usize,
    /// Mean payback period in weeks over rows that have one.
    pub mean_payback_weeks: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFleet {
    pub model: String,
    pub fleet_size: usize,
    pub mean_payback_weeks: Option<f64>,
}

/// Fleet size and payback of one model within one condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionModelFleet {
    pub condition: String,
    pub model: String,
    pub fleet_size: usize,
    pub mean_payback_weeks: Option<f64>,
}

/// Weekly payment of one model year, per condition and model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelYearPayment {
    pub condition: String,
    pub model: String,
    pub year: i64,
    pub count: usize,
    pub mean_weekly_payment: Option<f64>,
}

/// Vehicles of one condition, make, model and model year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleGroup {
    pub condition: String,
    pub make: String,
    pub model: String,
    pub year: i64,
    pub count: usize,
    pub mean_invoiced_amount: Option<f64>,
}

/// Leases started in one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyFleet {
    pub year: i64,
    pub month: i64,
    pub purchases: usize,
    pub mean_weekly_payment: Option<f64>,
}

/// Grouped counts and means describing the leased fleet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetReport {
    pub total_records: usize,
    /// Leases per make, largest first.
    pub make_counts: Vec<CategoryCount>,
    /// Leases per make and model, largest first.
    pub model_counts: Vec<MakeModelCount>,
    pub condition_counts: Vec<CategoryCount>,
    pub payback_by_condition: Vec<ConditionPayback>,
    pub model_fleet: Vec<ModelFleet>,
    /// Per condition, models largest fleet first.
    pub condition_model_fleet: Vec<ConditionModelFleet>,
    /// Per condition and model, model years oldest first.
    pub model_year_payment: Vec<ModelYearPayment>,
    pub condition_make_model_year: Vec<VehicleGroup>,
    /// Purchases per month, oldest first.
    pub monthly_fleet: Vec<MonthlyFleet>,
    /// Leases per state, largest first, over rows that carry a zip code.
    pub state_counts: Vec<CategoryCount>,
    /// Rows whose `Date` could not be parsed.
    pub unparsed_dates: usize,
}

impl FleetReport {
    /// Compute every aggregate from a normalized table.
    ///
    /// Missing columns read as all-absent, so a partial table yields a
    /// partial (but never failing) report.
    pub fn from_frame(df: &DataFrame) -> Result<Self> {
        let (frame, unparsed_dates) = typed_frame(df)?;

        let mut make_counts = category_counts(&frame, MAKE)?;
        sort_by_count(&mut make_counts, |c| c.count, |c| c.value.clone());

        let grouped = group(&frame, &[MAKE, MODEL], None)?;
        let makes = string_values(&grouped, MAKE)?;
        let models = string_values(&grouped, MODEL)?;
        let mut model_counts: Vec<MakeModelCount> = makes
            .into_iter()
            .zip(models)
            .zip(counts(&grouped)?)
            .filter_map(|((make, model), count)| {
                Some(MakeModelCount {
                    make: make?,
                    model: model?,
                    count,
                })
            })
            .collect();
        sort_by_count(&mut model_counts, |m| m.count, |m| (m.make.clone(), m.model.clone()));

        let mut condition_counts = category_counts(&frame, CONDITION)?;
        sort_by_count(&mut condition_counts, |c| c.count, |c| c.value.clone());

        let grouped = group(&frame, &[CONDITION], Some(PAYBACK))?;
        let mut payback_by_condition: Vec<ConditionPayback> = string_values(&grouped, CONDITION)?
            .into_iter()
            .zip(counts(&grouped)?)
            .zip(f64_values(&grouped, MEAN)?)
            .filter_map(|((condition, count), mean)| {
                Some(ConditionPayback {
                    condition: condition?,
                    count,
                    mean_payback_weeks: mean,
                })
            })
            .collect();
        payback_by_condition.sort_by(|a, b| a.condition.cmp(&b.condition));

        let grouped = group(&frame, &[MODEL], Some(PAYBACK))?;
        let mut model_fleet: Vec<ModelFleet> = string_values(&grouped, MODEL)?
            .into_iter()
            .zip(counts(&grouped)?)
            .zip(f64_values(&grouped, MEAN)?)
            .filter_map(|((model, fleet_size), mean)| {
                Some(ModelFleet {
                    model: model?,
                    fleet_size,
                    mean_payback_weeks: mean,
                })
            })
            .collect();
        sort_by_count(&mut model_fleet, |m| m.fleet_size, |m| m.model.clone());

        let grouped = group(&frame, &[CONDITION, MODEL], Some(PAYBACK))?;
        let mut condition_model_fleet: Vec<ConditionModelFleet> = string_values(&grouped, CONDITION)?
            .into_iter()
            .zip(string_values(&grouped, MODEL)?)
            .zip(counts(&grouped)?)
            .zip(f64_values(&grouped, MEAN)?)
            .filter_map(|(((condition, model), fleet_size), mean)| {
                Some(ConditionModelFleet {
                    condition: condition?,
                    model: model?,
                    fleet_size,
                    mean_payback_weeks: mean,
                })
            })
            .collect();
        condition_model_fleet.sort_by(|a, b| {
            (&a.condition, Reverse(a.fleet_size), &a.model)
                .cmp(&(&b.condition, Reverse(b.fleet_size), &b.model))
        });

        let grouped = group(&frame, &[CONDITION, MODEL, YEAR], Some(WEEKLY))?;
        let mut model_year_payment: Vec<ModelYearPayment> = string_values(&grouped, CONDITION)?
            .into_iter()
            .zip(string_values(&grouped, MODEL)?)
            .zip(i64_values(&grouped, YEAR)?)
            .zip(counts(&grouped)?)
            .zip(f64_values(&grouped, MEAN)?)
            .filter_map(|((((condition, model), year), count), mean)| {
                Some(ModelYearPayment {
                    condition: condition?,
                    model: model?,
                    year: year?,
                    count,
                    mean_weekly_payment: mean,
                })
            })
            .collect();
        model_year_payment.sort_by(|a, b| {
            (&a.condition, &a.model, a.year).cmp(&(&b.condition, &b.model, b.year))
        });

        let grouped = group(&frame, &[CONDITION, MAKE, MODEL, YEAR], Some(INVOICED))?;
        let mut condition_make_model_year: Vec<VehicleGroup> = string_values(&grouped, CONDITION)?
            .into_iter()
            .zip(string_values(&grouped, MAKE)?)
            .zip(string_values(&grouped, MODEL)?)
            .zip(i64_values(&grouped, YEAR)?)
            .zip(counts(&grouped)?)
            .zip(f64_values(&grouped, MEAN)?)
            .filter_map(|(((((condition, make), model), year), count), mean)| {
                Some(VehicleGroup {
                    condition: condition?,
                    make: make?,
                    model: model?,
                    year: year?,
                    count,
                    mean_invoiced_amount: mean,
                })
            })
            .collect();
        condition_make_model_year.sort_by(|a, b| {
            (&a.condition, Reverse(a.count), &a.make, &a.model, a.year)
                .cmp(&(&b.condition, Reverse(b.count), &b.make, &b.model, b.year))
        });

        let grouped = group(&frame, &[BUY_YEAR, BUY_MONTH], Some(WEEKLY))?;
        let mut monthly_fleet: Vec<MonthlyFleet> = i64_values(&grouped, BUY_YEAR)?
            .into_iter()
            .zip(i64_values(&grouped, BUY_MONTH)?)
            .zip(counts(&grouped)?)
            .zip(f64_values(&grouped, MEAN)?)
            .filter_map(|(((year, month), purchases), mean)| {
                Some(MonthlyFleet {
                    year: year?,
                    month: month?,
                    purchases,
                    mean_weekly_payment: mean,
                })
            })
            .collect();
        monthly_fleet.sort_by_key(|m| (m.year, m.month));

        let with_zip = frame.clone().lazy().filter(col(ZIP).is_not_null()).collect()?;
        let mut state_counts = category_counts(&with_zip, STATE)?;
        sort_by_count(&mut state_counts, |c| c.count, |c| c.value.clone());

        Ok(Self {
            total_records: df.height(),
            make_counts,
            model_counts,
            condition_counts,
            payback_by_condition,
            model_fleet,
            condition_model_fleet,
            model_year_payment,
            condition_make_model_year,
            monthly_fleet,
            state_counts,
            unparsed_dates,
        })
    }

    /// Mean payback period for one condition, if any row had one.
    pub fn mean_payback_for(&self, condition: &str) -> Option<f64> {
        self.payback_by_condition
            .iter()
            .find(|p| p.condition == condition)
            .and_then(|p| p.mean_payback_weeks)
    }
}

/// Parse a purchase timestamp into (year, month).
pub fn purchase_month(raw: &str) -> Option<(i64, i64)> {
    let raw = raw.trim();
    let date = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|dt| dt.date())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        })?;
    Some((date.year() as i64, date.month() as i64))
}

/// Build a frame with the typed columns the aggregates group on.
fn typed_frame(df: &DataFrame) -> Result<(DataFrame, usize)> {
    let mut unparsed = 0usize;
    let (buy_years, buy_months): (Vec<Option<i64>>, Vec<Option<i64>>) =
        optional_string_values(df, columns::DATE)?
            .iter()
            .map(|raw| match raw.as_deref().map(purchase_month) {
                Some(Some((year, month))) => (Some(year), Some(month)),
                Some(None) => {
                    unparsed += 1;
                    (None, None)
                }
                None => (None, None),
            })
            .unzip();

    let frame = DataFrame::new(vec![
        Column::new(MAKE.into(), optional_string_values(df, columns::MAKE)?),
        Column::new(MODEL.into(), optional_string_values(df, columns::MODEL)?),
        Column::new(CONDITION.into(), optional_string_values(df, columns::CONDITION)?),
        Column::new(STATE.into(), optional_string_values(df, columns::STATE)?),
        Column::new(ZIP.into(), optional_string_values(df, columns::ZIP)?),
        Column::new(YEAR.into(), optional_i64_values(df, columns::YEAR)?),
        Column::new(INVOICED.into(), optional_f64_values(df, columns::INVOICED_AMOUNT)?),
        Column::new(WEEKLY.into(), optional_f64_values(df, columns::WEEKLY_PAYMENT)?),
        Column::new(PAYBACK.into(), optional_f64_values(df, columns::PAYBACK_PERIOD)?),
        Column::new(BUY_YEAR.into(), buy_years),
        Column::new(BUY_MONTH.into(), buy_months),
    ])?;

    Ok((frame, unparsed))
}

/// Group rows with all keys present, counting them and optionally averaging `value`.
fn group(frame: &DataFrame, keys: &[&str], value: Option<&str>) -> Result<DataFrame> {
    let mut aggs = vec![len().alias(COUNT)];
    if let Some(value) = value {
        aggs.push(col(value).mean().alias(MEAN));
    }

    let mut lf = frame.clone().lazy();
    if let Some(present) = keys
        .iter()
        .map(|key| col(*key).is_not_null())
        .reduce(|a, b| a.and(b))
    {
        lf = lf.filter(present);
    }

    let by: Vec<Expr> = keys.iter().map(|key| col(*key)).collect();
    Ok(lf.group_by(by).agg(aggs).collect()?)
}

fn counts(grouped: &DataFrame) -> Result<Vec<usize>> {
    Ok(i64_values(grouped, COUNT)?
        .into_iter()
        .map(|c| c.unwrap_or(0).max(0) as usize)
        .collect())
}

fn category_counts(frame: &DataFrame, key: &str) -> Result<Vec<CategoryCount>> {
    let grouped = group(frame, &[key], None)?;
    Ok(string_values(&grouped, key)?
        .into_iter()
        .zip(counts(&grouped)?)
        .filter_map(|(value, count)| Some(CategoryCount { value: value?, count }))
        .collect())
}

/// Largest count first; ties broken by key so output is deterministic.
fn sort_by_count<T, K: Ord>(items: &mut [T], count: impl Fn(&T) -> usize, key: impl Fn(&T) -> K) {
    items.sort_by(|a, b| count(b).cmp(&count(a)).then_with(|| key(a).cmp(&key(b))));
}

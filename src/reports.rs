use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

use chrono::{Datelike, Months, NaiveDate};
use rust_decimal::Decimal;

use crate::error::Result;
use crate::repository::ClassificationRepo;

// ---------------------------------------------------------------------------
// Monthly spend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct SpendFilter {
    pub include_fixed_costs: bool,
    /// Category names to keep. An empty selection keeps every category
    /// rather than reporting nothing.
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthlySpend {
    /// First day of the month.
    pub month: NaiveDate,
    pub category: String,
    /// Signed sum of the month's amounts; outflows are negative.
    pub total: Decimal,
}

impl MonthlySpend {
    /// Outflow as a positive number.
    pub fn spend(&self) -> Decimal {
        -self.total
    }
}

fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Categorized expenses summed per month and category, ordered by month then
/// category name. Fixed costs are left out unless the filter asks for them.
pub fn monthly_spend(repo: &ClassificationRepo, filter: &SpendFilter) -> Result<Vec<MonthlySpend>> {
    let mut totals: BTreeMap<(NaiveDate, String), Decimal> = BTreeMap::new();
    for row in repo.categorized_amounts(filter.include_fixed_costs)? {
        if !filter.categories.is_empty() && !filter.categories.contains(&row.category) {
            continue;
        }
        *totals.entry((month_start(row.date), row.category)).or_default() += row.amount;
    }

    Ok(totals
        .into_iter()
        .map(|((month, category), total)| MonthlySpend {
            month,
            category,
            total,
        })
        .collect())
}

/// Every month from `first` to `last`, inclusive.
fn month_range(first: NaiveDate, last: NaiveDate) -> Vec<NaiveDate> {
    let mut months = Vec::new();
    let mut current = month_start(first);
    while current <= last {
        months.push(current);
        match current.checked_add_months(Months::new(1)) {
            Some(next) => current = next,
            None => break,
        }
    }
    months
}

// ---------------------------------------------------------------------------
// Averages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryAverage {
    pub category: String,
    pub average: Decimal,
}

/// Mean monthly spend per category, rounded to whole units, smallest first.
/// Months between a category's first and last spend with nothing booked
/// count as zero.
pub fn average_monthly(spend: &[MonthlySpend]) -> Vec<CategoryAverage> {
    let mut by_category: BTreeMap<&str, Vec<&MonthlySpend>> = BTreeMap::new();
    for item in spend {
        by_category.entry(item.category.as_str()).or_default().push(item);
    }

    let mut averages: Vec<CategoryAverage> = by_category
        .into_iter()
        .filter_map(|(category, items)| {
            let first = items.iter().map(|i| i.month).min()?;
            let last = items.iter().map(|i| i.month).max()?;
            let months = month_range(first, last).len().max(1);
            let sum: Decimal = items.iter().map(|i| i.spend()).sum();
            Some(CategoryAverage {
                category: category.to_string(),
                average: (sum / Decimal::from(months)).round_dp(0),
            })
        })
        .collect();
    averages.sort_by(|a, b| a.average.cmp(&b.average).then_with(|| a.category.cmp(&b.category)));
    averages
}

// ---------------------------------------------------------------------------
// Month x category table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendTable {
    pub categories: Vec<String>,
    /// One row per month, one spend value per category (zero when empty).
    pub rows: Vec<(NaiveDate, Vec<Decimal>)>,
}

pub fn pivot(spend: &[MonthlySpend]) -> SpendTable {
    let categories: Vec<String> = spend
        .iter()
        .map(|s| s.category.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let (Some(first), Some(last)) = (
        spend.iter().map(|s| s.month).min(),
        spend.iter().map(|s| s.month).max(),
    ) else {
        return SpendTable {
            categories,
            rows: Vec::new(),
        };
    };

    let lookup: BTreeMap<(NaiveDate, &str), Decimal> = spend
        .iter()
        .map(|s| ((s.month, s.category.as_str()), s.spend()))
        .collect();

    let rows = month_range(first, last)
        .into_iter()
        .map(|month| {
            let values = categories
                .iter()
                .map(|c| lookup.get(&(month, c.as_str())).copied().unwrap_or_default())
                .collect();
            (month, values)
        })
        .collect();

    SpendTable { categories, rows }
}

/// Writes the table as CSV: a `date` column followed by one column per category.
pub fn write_csv<W: Write>(table: &SpendTable, writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    let mut header = vec!["date".to_string()];
    header.extend(table.categories.iter().cloned());
    wtr.write_record(&header)?;
    for (month, values) in &table.rows {
        let mut record = vec![month.format("%Y-%m-%d").to_string()];
        record.extend(values.iter().map(Decimal::to_string));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

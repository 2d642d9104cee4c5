use std::collections::HashSet;
use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};
use rust_decimal::Decimal;

use crate::error::Result;
use crate::models::{Category, Expense, Transaction};

const EXPENSE_COLUMNS: &str = "id, hash, date, amount, description, category_id";

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn category_from_row(row: &Row) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        is_fixed_cost: row.get(2)?,
    })
}

fn expense_from_row(row: &Row) -> rusqlite::Result<Expense> {
    let date: String = row.get(2)?;
    let amount: String = row.get(3)?;
    Ok(Expense {
        id: row.get(0)?,
        hash: row.get(1)?,
        date: NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|e| conversion_error(2, e))?,
        amount: Decimal::from_str(&amount).map_err(|e| conversion_error(3, e))?,
        description: row.get(4)?,
        category_id: row.get(5)?,
    })
}

/// A categorized expense reduced to what spend reports need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorizedAmount {
    pub date: NaiveDate,
    pub amount: Decimal,
    pub category: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCounts {
    pub expenses: i64,
    pub uncategorized: i64,
    pub categories: i64,
}

/// All reads and writes of categories and expenses go through here.
/// Every mutating call commits before it returns.
pub struct ClassificationRepo<'c> {
    conn: &'c Connection,
}

impl<'c> ClassificationRepo<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Existing category on exact name match, otherwise a newly created one.
    pub fn add_category(&self, name: &str, is_fixed_cost: bool) -> Result<Category> {
        if let Some(existing) = self.get_category_by_name(name)? {
            return Ok(existing);
        }
        self.conn.execute(
            "INSERT INTO categories (name, is_fixed_cost) VALUES (?1, ?2)",
            rusqlite::params![name, is_fixed_cost],
        )?;
        let category = Category {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
            is_fixed_cost,
        };
        tracing::info!(id = category.id, name, is_fixed_cost, "added category");
        Ok(category)
    }

    pub fn get_category_by_name(&self, name: &str) -> Result<Option<Category>> {
        let category = self
            .conn
            .query_row(
                "SELECT id, name, is_fixed_cost FROM categories WHERE name = ?1",
                [name],
                category_from_row,
            )
            .optional()?;
        Ok(category)
    }

    pub fn get_categories(&self) -> Result<Vec<Category>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, is_fixed_cost FROM categories ORDER BY id")?;
        let categories = stmt
            .query_map([], category_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(categories)
    }

    /// Inserts every transaction whose hash is not stored yet and returns the
    /// new expenses. Known hashes, including repeats inside `transactions`,
    /// are skipped.
    pub fn add_expenses(&self, transactions: &[Transaction]) -> Result<Vec<Expense>> {
        let tx = self.conn.unchecked_transaction()?;
        let mut seen: HashSet<String> = {
            let mut stmt = tx.prepare("SELECT hash FROM expenses")?;
            let hashes = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<_, _>>()?;
            hashes
        };

        let mut inserted = Vec::new();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO expenses (hash, date, amount, description) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for txn in transactions {
                if !seen.insert(txn.hash.clone()) {
                    tracing::debug!(hash = %txn.hash, "skipping known transaction");
                    continue;
                }
                stmt.execute(rusqlite::params![
                    txn.hash,
                    txn.date.format("%Y-%m-%d").to_string(),
                    txn.amount.to_string(),
                    txn.description,
                ])?;
                inserted.push(Expense {
                    id: tx.last_insert_rowid(),
                    hash: txn.hash.clone(),
                    date: txn.date,
                    amount: txn.amount,
                    description: txn.description.clone(),
                    category_id: None,
                });
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn get_expense(&self, id: i64) -> Result<Option<Expense>> {
        let expense = self
            .conn
            .query_row(
                &format!("SELECT {EXPENSE_COLUMNS} FROM expenses WHERE id = ?1"),
                [id],
                expense_from_row,
            )
            .optional()?;
        Ok(expense)
    }

    /// One expense without a category, or `None` once everything is categorized.
    pub fn get_uncategorized_expense(&self) -> Result<Option<Expense>> {
        let expense = self
            .conn
            .query_row(
                &format!(
                    "SELECT {EXPENSE_COLUMNS} FROM expenses WHERE category_id IS NULL \
                     ORDER BY id LIMIT 1"
                ),
                [],
                expense_from_row,
            )
            .optional()?;
        Ok(expense)
    }

    /// Assigns `category` to the expense and to every other uncategorized
    /// expense with the same description. Unknown ids are a no-op.
    /// Returns the number of expenses updated.
    pub fn set_category(&self, expense_id: i64, category: &Category) -> Result<usize> {
        let Some(expense) = self.get_expense(expense_id)? else {
            tracing::debug!(expense_id, "set_category on unknown expense");
            return Ok(0);
        };
        let updated = self.conn.execute(
            "UPDATE expenses SET category_id = ?1 WHERE description = ?2 AND category_id IS NULL",
            rusqlite::params![category.id, expense.description],
        )?;
        tracing::info!(
            expense_id,
            category = %category.name,
            updated,
            description = %expense.description,
            "categorized expenses"
        );
        Ok(updated)
    }

    /// Every expense that has a category, joined to the category name.
    /// Fixed-cost categories are left out unless `include_fixed_costs`.
    pub fn categorized_amounts(&self, include_fixed_costs: bool) -> Result<Vec<CategorizedAmount>> {
        let mut stmt = self.conn.prepare(
            "SELECT e.date, e.amount, c.name \
             FROM expenses e JOIN categories c ON c.id = e.category_id \
             WHERE (?1 OR c.is_fixed_cost = 0) \
             ORDER BY e.date, e.id",
        )?;
        let rows = stmt
            .query_map([include_fixed_costs], |row| {
                let date: String = row.get(0)?;
                let amount: String = row.get(1)?;
                Ok(CategorizedAmount {
                    date: NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                        .map_err(|e| conversion_error(0, e))?,
                    amount: Decimal::from_str(&amount).map_err(|e| conversion_error(1, e))?,
                    category: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn counts(&self) -> Result<StoreCounts> {
        let count = |sql: &str| -> Result<i64> { Ok(self.conn.query_row(sql, [], |r| r.get(0))?) };
        Ok(StoreCounts {
            expenses: count("SELECT count(*) FROM expenses")?,
            uncategorized: count("SELECT count(*) FROM expenses WHERE category_id IS NULL")?,
            categories: count("SELECT count(*) FROM categories")?,
        })
    }
}

use chrono::NaiveDate;
use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub is_fixed_cost: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expense {
    pub id: i64,
    pub hash: String,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub description: String,
    pub category_id: Option<i64>,
}

/// Intermediate representation from the statement parser before DB insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub hash: String,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub description: String,
    pub balance: Option<Decimal>,
}

impl std::fmt::Display for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Date: {} Amount: {} Description: {}",
            self.date, self.amount, self.description
        )
    }
}

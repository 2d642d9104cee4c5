use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use comfy_table::{Cell, CellAlignment, Table};

use crate::error::Result;
use crate::fmt::amount;
use crate::reports::{average_monthly, monthly_spend, pivot, write_csv, SpendFilter};
use crate::repository::ClassificationRepo;

use super::open_store;

pub fn run(
    db: Option<&Path>,
    include_fixed: bool,
    categories: Vec<String>,
    export: Option<PathBuf>,
) -> Result<()> {
    let conn = open_store(db)?;
    let filter = SpendFilter {
        include_fixed_costs: include_fixed,
        categories,
    };
    let spend = monthly_spend(&ClassificationRepo::new(&conn), &filter)?;

    if spend.is_empty() {
        println!("No categorized expenses to report.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Category", "Avg / month"]);
    for avg in average_monthly(&spend) {
        table.add_row(vec![
            Cell::new(avg.category),
            Cell::new(amount(avg.average)).set_alignment(CellAlignment::Right),
        ]);
    }
    println!("Average monthly spend\n{table}");

    if let Some(path) = export {
        let writer = BufWriter::new(File::create(&path)?);
        write_csv(&pivot(&spend), writer)?;
        println!("Exported monthly spend to {}", path.display());
    }
    Ok(())
}

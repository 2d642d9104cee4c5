use std::path::Path;

use comfy_table::{Cell, Table};

use crate::error::Result;
use crate::repository::ClassificationRepo;

use super::open_store;

pub fn add(db: Option<&Path>, name: &str, fixed: bool) -> Result<()> {
    let conn = open_store(db)?;
    let category = ClassificationRepo::new(&conn).add_category(name.trim(), fixed)?;
    println!("Category {}: {}", category.id, category.name);
    Ok(())
}

pub fn list(db: Option<&Path>) -> Result<()> {
    let conn = open_store(db)?;
    let categories = ClassificationRepo::new(&conn).get_categories()?;

    if categories.is_empty() {
        println!("No categories yet. Add one with `budget category add <name>`.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Fixed cost"]);
    for cat in categories {
        table.add_row(vec![
            Cell::new(cat.id),
            Cell::new(cat.name),
            Cell::new(if cat.is_fixed_cost { "yes" } else { "no" }),
        ]);
    }
    println!("Categories\n{table}");
    Ok(())
}

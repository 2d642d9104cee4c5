use std::io::{BufRead, IsTerminal, Write};
use std::path::Path;

use colored::Colorize;
use comfy_table::{Cell, Table};
use dialoguer::{Confirm, Input};

use crate::categorizer::{Categorizer, Prompter, SessionOutcome};
use crate::error::{BudgetError, Result};
use crate::fmt::amount;
use crate::models::{Category, Expense};
use crate::repository::ClassificationRepo;

use super::import::import_into;
use super::open_store;

const CHOICE_PROMPT: &str = "Category id, (n)ew category or (q)uit";

pub fn run(db: Option<&Path>, file: Option<&Path>) -> Result<SessionOutcome> {
    let conn = open_store(db)?;
    if let Some(file) = file {
        import_into(&conn, file, false)?;
    }

    let mut categorizer = Categorizer::new(ClassificationRepo::new(&conn))?;
    if categorizer.categories().is_empty() {
        println!("No categories yet. Answer `n` to create the first one.");
    }
    let outcome = if std::io::stdin().is_terminal() {
        categorizer.run(&mut ConsolePrompter)?
    } else {
        let stdin = std::io::stdin();
        categorizer.run(&mut LinePrompter::new(stdin.lock(), std::io::stdout()))?
    };

    match outcome {
        SessionOutcome::Done { categorized } => println!(
            "{}",
            format!("All expenses categorized ({categorized} this session).").green()
        ),
        SessionOutcome::Quit { categorized } => println!(
            "{}",
            format!("Stopped. {categorized} expenses categorized this session.").yellow()
        ),
    }
    Ok(outcome)
}

fn expense_lines(expense: &Expense) -> [String; 3] {
    [
        "\u{2500}".repeat(60),
        format!("  Date:        {}", expense.date),
        format!("  Description: {}", expense.description),
    ]
}

fn amount_line(expense: &Expense) -> String {
    format!("  Amount:      {}", amount(expense.amount))
}

fn category_table(categories: &[Category]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Fixed cost"]);
    for cat in categories {
        table.add_row(vec![
            Cell::new(cat.id),
            Cell::new(&cat.name),
            Cell::new(if cat.is_fixed_cost { "yes" } else { "" }),
        ]);
    }
    table
}

fn applied_line(category: &Category, updated: usize) -> String {
    let noun = if updated == 1 { "expense" } else { "expenses" };
    format!("\u{2192} {updated} {noun} categorized as {}", category.name)
}

fn prompt_error(e: dialoguer::Error) -> BudgetError {
    BudgetError::Other(format!("prompt failed: {e}"))
}

/// Interactive terminal prompts.
struct ConsolePrompter;

impl Prompter for ConsolePrompter {
    fn present(&mut self, expense: &Expense, categories: &[Category]) -> Result<()> {
        if !categories.is_empty() {
            println!("Categories\n{}", category_table(categories));
        }
        for line in expense_lines(expense) {
            println!("{line}");
        }
        if expense.amount.is_sign_negative() {
            println!("{}", amount_line(expense).red());
        } else {
            println!("{}", amount_line(expense).green());
        }
        println!();
        Ok(())
    }

    fn choose(&mut self) -> Result<Option<String>> {
        let choice: String = Input::new()
            .with_prompt(CHOICE_PROMPT)
            .allow_empty(true)
            .interact_text()
            .map_err(prompt_error)?;
        Ok(Some(choice))
    }

    fn new_category(&mut self) -> Result<Option<(String, bool)>> {
        let name: String = Input::new()
            .with_prompt("Category name")
            .interact_text()
            .map_err(prompt_error)?;
        let fixed = Confirm::new()
            .with_prompt("Is this a fixed cost?")
            .default(false)
            .interact()
            .map_err(prompt_error)?;
        Ok(Some((name, fixed)))
    }

    fn invalid(&mut self, raw: &str) -> Result<()> {
        println!("{}", format!("Invalid selection: {raw:?}").red());
        Ok(())
    }

    fn applied(&mut self, _expense: &Expense, category: &Category, updated: usize) -> Result<()> {
        println!("{}", applied_line(category, updated).green());
        println!();
        Ok(())
    }
}

/// Plain line-based prompts for piped input.
struct LinePrompter<R: BufRead, W: Write> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> LinePrompter<R, W> {
    fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn ask(&mut self, prompt: &str) -> Result<Option<String>> {
        write!(self.output, "{prompt}: ")?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            writeln!(self.output)?;
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}

impl<R: BufRead, W: Write> Prompter for LinePrompter<R, W> {
    fn present(&mut self, expense: &Expense, categories: &[Category]) -> Result<()> {
        for cat in categories {
            let tag = if cat.is_fixed_cost { " (fixed)" } else { "" };
            writeln!(self.output, "  [{}] {}{tag}", cat.id, cat.name)?;
        }
        for line in expense_lines(expense) {
            writeln!(self.output, "{line}")?;
        }
        writeln!(self.output, "{}", amount_line(expense))?;
        Ok(())
    }

    fn choose(&mut self) -> Result<Option<String>> {
        self.ask(CHOICE_PROMPT)
    }

    fn new_category(&mut self) -> Result<Option<(String, bool)>> {
        let Some(name) = self.ask("Category name")? else {
            return Ok(None);
        };
        let fixed = self
            .ask("Is this a fixed cost? [y/N]")?
            .map(|answer| matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
            .unwrap_or(false);
        Ok(Some((name, fixed)))
    }

    fn invalid(&mut self, raw: &str) -> Result<()> {
        writeln!(self.output, "Invalid selection: {raw:?}")?;
        Ok(())
    }

    fn applied(&mut self, _expense: &Expense, category: &Category, updated: usize) -> Result<()> {
        writeln!(self.output, "{}", applied_line(category, updated))?;
        Ok(())
    }
}

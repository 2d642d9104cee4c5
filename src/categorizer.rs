use crate::error::Result;
use crate::models::{Category, Expense};
use crate::repository::ClassificationRepo;

const NEW_TOKEN: &str = "new category";
const QUIT_TOKEN: &str = "quit";

/// What the user typed at the category prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Choice {
    Existing(i64),
    New,
    Quit,
    Invalid(String),
}

/// A fully resolved user decision for the current expense.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    UseExisting(i64),
    CreateNew { name: String, is_fixed_cost: bool },
    Quit,
    Invalid(String),
}

/// Control words are case-insensitive and may be shortened to any prefix
/// (`n`, `new`, `q`, ...). Numbers only count when they name a known category.
pub fn parse_choice(input: &str, categories: &[Category]) -> Choice {
    let token = input.trim().to_lowercase();
    if token.is_empty() {
        return Choice::Invalid(input.to_string());
    }
    if NEW_TOKEN.starts_with(&token) {
        return Choice::New;
    }
    if QUIT_TOKEN.starts_with(&token) {
        return Choice::Quit;
    }
    match token.parse::<i64>() {
        Ok(id) if categories.iter().any(|c| c.id == id) => Choice::Existing(id),
        _ => Choice::Invalid(input.to_string()),
    }
}

/// Terminal surface of the categorization loop.
pub trait Prompter {
    fn present(&mut self, expense: &Expense, categories: &[Category]) -> Result<()>;

    /// Raw selection text; `None` once input is closed.
    fn choose(&mut self) -> Result<Option<String>>;

    /// Name and fixed-cost flag for a new category; `None` once input is closed.
    fn new_category(&mut self) -> Result<Option<(String, bool)>>;

    fn invalid(&mut self, raw: &str) -> Result<()>;

    fn applied(&mut self, expense: &Expense, category: &Category, updated: usize) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Applied { category: Category, updated: usize },
    Terminate,
    Reprompt(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// No uncategorized expenses left.
    Done { categorized: usize },
    /// The user quit; the expense on screen was left untouched.
    Quit { categorized: usize },
}

enum LoopState {
    AwaitingExpense,
    PresentingChoices(Expense),
    AwaitingInput(Expense),
    Done,
    Terminated,
}

pub struct Categorizer<'c> {
    repo: ClassificationRepo<'c>,
    categories: Vec<Category>,
}

impl<'c> Categorizer<'c> {
    pub fn new(repo: ClassificationRepo<'c>) -> Result<Self> {
        let categories = repo.get_categories()?;
        Ok(Self { repo, categories })
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    fn read_command<P: Prompter>(&self, prompter: &mut P) -> Result<Command> {
        let Some(input) = prompter.choose()? else {
            return Ok(Command::Quit);
        };
        let command = match parse_choice(&input, &self.categories) {
            Choice::Existing(id) => Command::UseExisting(id),
            Choice::Quit => Command::Quit,
            Choice::Invalid(raw) => Command::Invalid(raw),
            Choice::New => match prompter.new_category()? {
                None => Command::Quit,
                Some((name, _)) if name.trim().is_empty() => Command::Invalid(name),
                Some((name, is_fixed_cost)) => Command::CreateNew {
                    name: name.trim().to_string(),
                    is_fixed_cost,
                },
            },
        };
        Ok(command)
    }

    /// Applies one command to `expense`.
    pub fn apply_command(&mut self, expense: &Expense, command: Command) -> Result<Transition> {
        let category = match command {
            Command::Quit => return Ok(Transition::Terminate),
            Command::Invalid(raw) => return Ok(Transition::Reprompt(raw)),
            Command::UseExisting(id) => match self.categories.iter().find(|c| c.id == id) {
                Some(category) => category.clone(),
                None => return Ok(Transition::Reprompt(id.to_string())),
            },
            Command::CreateNew {
                name,
                is_fixed_cost,
            } => {
                let category = self.repo.add_category(&name, is_fixed_cost)?;
                if !self.categories.iter().any(|c| c.id == category.id) {
                    self.categories.push(category.clone());
                }
                category
            }
        };
        let updated = self.repo.set_category(expense.id, &category)?;
        Ok(Transition::Applied { category, updated })
    }

    /// Runs until every expense has a category or the user quits.
    pub fn run<P: Prompter>(&mut self, prompter: &mut P) -> Result<SessionOutcome> {
        let mut categorized = 0usize;
        let mut state = LoopState::AwaitingExpense;
        loop {
            state = match state {
                LoopState::AwaitingExpense => match self.repo.get_uncategorized_expense()? {
                    Some(expense) => {
                        tracing::debug!(
                            expense_id = expense.id,
                            hash = %expense.hash,
                            "next uncategorized expense"
                        );
                        LoopState::PresentingChoices(expense)
                    }
                    None => LoopState::Done,
                },
                LoopState::PresentingChoices(expense) => {
                    prompter.present(&expense, &self.categories)?;
                    LoopState::AwaitingInput(expense)
                }
                LoopState::AwaitingInput(expense) => {
                    let command = self.read_command(prompter)?;
                    tracing::debug!(expense_id = expense.id, ?command, "categorize command");
                    match self.apply_command(&expense, command)? {
                        Transition::Applied { category, updated } => {
                            prompter.applied(&expense, &category, updated)?;
                            categorized += updated;
                            LoopState::AwaitingExpense
                        }
                        Transition::Terminate => LoopState::Terminated,
                        Transition::Reprompt(raw) => {
                            prompter.invalid(&raw)?;
                            LoopState::AwaitingInput(expense)
                        }
                    }
                }
                LoopState::Done => {
                    tracing::info!(categorized, "categorization complete");
                    return Ok(SessionOutcome::Done { categorized });
                }
                LoopState::Terminated => {
                    tracing::info!(categorized, "categorization stopped by user");
                    return Ok(SessionOutcome::Quit { categorized });
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::str::FromStr;

    use chrono::NaiveDate;
    use rusqlite::Connection;
    use rust_decimal::Decimal;

    use super::*;
    use crate::db::{get_connection, init_db};
    use crate::importer::content_hash;
    use crate::models::Transaction;

    fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        (dir, conn)
    }

    fn seed_expenses(conn: &Connection, descriptions: &[&str]) -> Vec<Expense> {
        let txns: Vec<Transaction> = descriptions
            .iter()
            .enumerate()
            .map(|(i, desc)| Transaction {
                hash: content_hash(&[&i.to_string(), desc]),
                date: NaiveDate::from_ymd_opt(2022, 8, 26).unwrap(),
                amount: Decimal::from_str("-25.00").unwrap(),
                description: desc.to_string(),
                balance: None,
            })
            .collect();
        ClassificationRepo::new(conn).add_expenses(&txns).unwrap()
    }

    fn category(id: i64, name: &str) -> Category {
        Category {
            id,
            name: name.to_string(),
            is_fixed_cost: false,
        }
    }

    /// Replays canned answers and records what the loop showed.
    #[derive(Default)]
    struct ScriptedPrompter {
        choices: VecDeque<String>,
        new_categories: VecDeque<(String, bool)>,
        presented: Vec<i64>,
        invalid: Vec<String>,
        applied: Vec<(i64, String, usize)>,
    }

    impl ScriptedPrompter {
        fn new(choices: &[&str]) -> Self {
            Self {
                choices: choices.iter().map(|c| c.to_string()).collect(),
                ..Self::default()
            }
        }

        fn with_new(mut self, name: &str, fixed: bool) -> Self {
            self.new_categories.push_back((name.to_string(), fixed));
            self
        }
    }

    impl Prompter for ScriptedPrompter {
        fn present(&mut self, expense: &Expense, _categories: &[Category]) -> Result<()> {
            self.presented.push(expense.id);
            Ok(())
        }

        fn choose(&mut self) -> Result<Option<String>> {
            Ok(self.choices.pop_front())
        }

        fn new_category(&mut self) -> Result<Option<(String, bool)>> {
            Ok(self.new_categories.pop_front())
        }

        fn invalid(&mut self, raw: &str) -> Result<()> {
            self.invalid.push(raw.to_string());
            Ok(())
        }

        fn applied(&mut self, expense: &Expense, category: &Category, updated: usize) -> Result<()> {
            self.applied.push((expense.id, category.name.clone(), updated));
            Ok(())
        }
    }

    #[test]
    fn test_parse_choice_control_tokens() {
        let cats = [category(1, "Groceries")];
        for input in ["n", "N", "new", "New Category", " new category "] {
            assert_eq!(parse_choice(input, &cats), Choice::New, "input {input:?}");
        }
        for input in ["q", "Q", "quit", "QUIT"] {
            assert_eq!(parse_choice(input, &cats), Choice::Quit, "input {input:?}");
        }
    }

    #[test]
    fn test_parse_choice_category_ids() {
        let cats = [category(1, "Groceries"), category(7, "Rent")];
        assert_eq!(parse_choice("7", &cats), Choice::Existing(7));
        assert_eq!(parse_choice(" 1 ", &cats), Choice::Existing(1));
        assert_eq!(parse_choice("2", &cats), Choice::Invalid("2".to_string()));
        assert_eq!(parse_choice("", &cats), Choice::Invalid(String::new()));
        assert_eq!(parse_choice("groceries", &cats), Choice::Invalid("groceries".to_string()));
        assert_eq!(parse_choice("newt", &cats), Choice::Invalid("newt".to_string()));
    }

    #[test]
    fn test_quit_leaves_current_expense_uncategorized() {
        let (_dir, conn) = test_db();
        let expenses = seed_expenses(&conn, &["1155 ATP EJENDOMME"]);
        ClassificationRepo::new(&conn).add_category("Housing", true).unwrap();

        let mut categorizer = Categorizer::new(ClassificationRepo::new(&conn)).unwrap();
        let mut prompter = ScriptedPrompter::new(&["q"]);
        let outcome = categorizer.run(&mut prompter).unwrap();

        assert_eq!(outcome, SessionOutcome::Quit { categorized: 0 });
        assert_eq!(prompter.presented, vec![expenses[0].id]);
        let repo = ClassificationRepo::new(&conn);
        assert_eq!(repo.get_expense(expenses[0].id).unwrap().unwrap().category_id, None);
    }

    #[test]
    fn test_existing_category_applies_and_propagates() {
        let (_dir, conn) = test_db();
        let expenses = seed_expenses(&conn, &["Netto", "Netto", "Kopper"]);
        let repo = ClassificationRepo::new(&conn);
        let groceries = repo.add_category("Groceries", false).unwrap();
        let gifts = repo.add_category("Gifts", false).unwrap();

        let mut categorizer = Categorizer::new(ClassificationRepo::new(&conn)).unwrap();
        let (g, k) = (groceries.id.to_string(), gifts.id.to_string());
        let mut prompter = ScriptedPrompter::new(&[g.as_str(), k.as_str()]);
        let outcome = categorizer.run(&mut prompter).unwrap();

        assert_eq!(outcome, SessionOutcome::Done { categorized: 3 });
        // The second Netto row is never shown.
        assert_eq!(prompter.presented, vec![expenses[0].id, expenses[2].id]);
        assert_eq!(prompter.applied[0], (expenses[0].id, "Groceries".to_string(), 2));
        assert_eq!(repo.get_uncategorized_expense().unwrap(), None);
    }

    #[test]
    fn test_new_category_is_created_and_added_to_working_list() {
        let (_dir, conn) = test_db();
        let expenses = seed_expenses(&conn, &["Gorillas Technologie"]);

        let mut categorizer = Categorizer::new(ClassificationRepo::new(&conn)).unwrap();
        assert!(categorizer.categories().is_empty());
        let mut prompter = ScriptedPrompter::new(&["n"]).with_new("Groceries", false);
        let outcome = categorizer.run(&mut prompter).unwrap();

        assert_eq!(outcome, SessionOutcome::Done { categorized: 1 });
        assert_eq!(categorizer.categories().len(), 1);
        let created = &categorizer.categories()[0];
        assert_eq!(created.name, "Groceries");
        let repo = ClassificationRepo::new(&conn);
        assert_eq!(
            repo.get_expense(expenses[0].id).unwrap().unwrap().category_id,
            Some(created.id)
        );
    }

    #[test]
    fn test_new_category_with_existing_name_reuses_it() {
        let (_dir, conn) = test_db();
        seed_expenses(&conn, &["Husleje"]);
        let rent = ClassificationRepo::new(&conn).add_category("Rent", true).unwrap();

        let mut categorizer = Categorizer::new(ClassificationRepo::new(&conn)).unwrap();
        let mut prompter = ScriptedPrompter::new(&["new"]).with_new("Rent", false);
        categorizer.run(&mut prompter).unwrap();

        assert_eq!(categorizer.categories(), &[rent]);
    }

    #[test]
    fn test_invalid_input_reprompts_same_expense() {
        let (_dir, conn) = test_db();
        let expenses = seed_expenses(&conn, &["Kopper"]);
        ClassificationRepo::new(&conn).add_category("Gifts", false).unwrap();

        let mut categorizer = Categorizer::new(ClassificationRepo::new(&conn)).unwrap();
        let mut prompter = ScriptedPrompter::new(&["banana", "42", "q"]);
        let outcome = categorizer.run(&mut prompter).unwrap();

        assert_eq!(outcome, SessionOutcome::Quit { categorized: 0 });
        assert_eq!(prompter.invalid, vec!["banana".to_string(), "42".to_string()]);
        // Presented once; invalid input does not advance.
        assert_eq!(prompter.presented, vec![expenses[0].id]);
    }

    #[test]
    fn test_blank_new_category_name_is_invalid() {
        let (_dir, conn) = test_db();
        seed_expenses(&conn, &["Kopper"]);

        let mut categorizer = Categorizer::new(ClassificationRepo::new(&conn)).unwrap();
        let mut prompter = ScriptedPrompter::new(&["n", "q"]).with_new("   ", false);
        categorizer.run(&mut prompter).unwrap();

        assert_eq!(prompter.invalid.len(), 1);
        assert_eq!(ClassificationRepo::new(&conn).counts().unwrap().categories, 0);
    }

    #[test]
    fn test_closed_input_quits() {
        let (_dir, conn) = test_db();
        seed_expenses(&conn, &["Kopper"]);
        let mut categorizer = Categorizer::new(ClassificationRepo::new(&conn)).unwrap();
        let mut prompter = ScriptedPrompter::new(&[]);
        assert_eq!(
            categorizer.run(&mut prompter).unwrap(),
            SessionOutcome::Quit { categorized: 0 }
        );
    }

    #[test]
    fn test_empty_queue_is_done_immediately() {
        let (_dir, conn) = test_db();
        let mut categorizer = Categorizer::new(ClassificationRepo::new(&conn)).unwrap();
        let mut prompter = ScriptedPrompter::new(&[]);
        assert_eq!(
            categorizer.run(&mut prompter).unwrap(),
            SessionOutcome::Done { categorized: 0 }
        );
        assert!(prompter.presented.is_empty());
    }

    #[test]
    fn test_apply_command_unknown_id_reprompts() {
        let (_dir, conn) = test_db();
        let expenses = seed_expenses(&conn, &["Kopper"]);
        let mut categorizer = Categorizer::new(ClassificationRepo::new(&conn)).unwrap();
        let transition = categorizer
            .apply_command(&expenses[0], Command::UseExisting(5))
            .unwrap();
        assert_eq!(transition, Transition::Reprompt("5".to_string()));
    }
}

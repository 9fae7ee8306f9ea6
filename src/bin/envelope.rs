//! CLI binary for keeping an envelope-budgeted ledger on disk.

use std::fs;
use std::io::{self, Write as _};
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{Datelike as _, Utc};
use clap::{Args, Parser, Subcommand};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, Table};
use envelope_ledger::LedgerError;
use envelope_ledger::cache::InMemoryCache;
use envelope_ledger::classifier::HttpClassifier;
use envelope_ledger::config::EngineConfig;
use envelope_ledger::engine::Engine;
use envelope_ledger::import::rows_from_json;
use envelope_ledger::ledger::{Reconciliation, TransactionFilter};
use envelope_ledger::models::{
    Account, AccountId, BudgetCategory, BudgetCategoryId, BudgetLine, ClassificationInput,
    ClassificationResult, Decimal, ImportBatch, ImportBatchId, ImportOptions, ImportResult,
    NaiveDate, NewTransaction, OrganizationId, Transaction, TransactionId, TransactionKind,
    TransactionPatch,
};
use envelope_ledger::storage::FileStore;
use owo_colors::OwoColorize;
use tokio::runtime::Runtime;

/// Environment variable naming the external classifier base URL.
const CLASSIFIER_URL_ENV: &str = "ENVELOPE_CLASSIFIER_URL";

/// Environment variable holding the external classifier API key.
const CLASSIFIER_KEY_ENV: &str = "ENVELOPE_CLASSIFIER_KEY";

/// Engine type the CLI works with.
type CliEngine = Engine<FileStore, InMemoryCache, Option<HttpClassifier>>;

/// Envelope ledger CLI: accounts, transactions, monthly envelopes and
/// statement imports.
#[derive(Debug, Parser)]
#[command(name = "envelope", version, about)]
struct Cli {
    /// Override the storage directory (default: XDG data dir).
    #[arg(long, global = true, value_name = "DIR", env = "ENVELOPE_DATA_DIR")]
    data_dir: Option<PathBuf>,
    /// Organization whose books are read and written.
    #[arg(long, global = true, env = "ENVELOPE_ORG", default_value = "default")]
    org: OrganizationId,
    /// JSON configuration file (default: environment variables).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
enum Command {
    /// Manage accounts.
    #[command(subcommand)]
    Account(AccountCommand),
    /// Manage envelope categories.
    #[command(subcommand)]
    Category(CategoryCommand),
    /// Record, list, edit and delete transactions.
    #[command(subcommand)]
    Tx(TxCommand),
    /// Allocate money to envelopes and show a month.
    #[command(subcommand)]
    Budget(BudgetCommand),
    /// Import statement rows from a JSON file.
    Import(ImportArgs),
    /// Show an import batch.
    Batch {
        /// Batch identifier.
        id: ImportBatchId,
    },
    /// Suggest a category for a description.
    Classify(ClassifyArgs),
}

/// `account` subcommands.
#[derive(Debug, Subcommand)]
enum AccountCommand {
    /// Open a new account.
    Add {
        /// Display name.
        name: String,
        /// ISO 4217 currency code.
        #[arg(long, default_value = "USD")]
        currency: String,
        /// Opening balance.
        #[arg(long, default_value = "0", value_parser = parse_amount)]
        initial: Decimal,
    },
    /// List accounts.
    List,
    /// Compare an account's balance with its transactions.
    Reconcile {
        /// Account identifier.
        id: AccountId,
    },
}

/// `category` subcommands.
#[derive(Debug, Subcommand)]
enum CategoryCommand {
    /// Create an envelope category.
    Add {
        /// Display name.
        name: String,
        /// Optional parent group.
        #[arg(long)]
        group: Option<String>,
    },
    /// List envelope categories.
    List,
}

/// `tx` subcommands.
#[derive(Debug, Subcommand)]
enum TxCommand {
    /// Record a transaction.
    Add(TxAddArgs),
    /// List transactions, optionally filtered.
    List(TxListArgs),
    /// Change fields of a transaction.
    Edit(TxEditArgs),
    /// Delete a transaction.
    Delete {
        /// Transaction identifier.
        id: TransactionId,
    },
}

/// Arguments for `tx add`.
#[derive(Debug, Args)]
struct TxAddArgs {
    /// Account to book on.
    #[arg(long)]
    account: AccountId,
    /// Amount (non-negative).
    #[arg(value_parser = parse_amount)]
    amount: Decimal,
    /// Description or payee.
    description: String,
    /// income, expense or transfer.
    #[arg(long, default_value = "expense", value_parser = parse_kind)]
    kind: TransactionKind,
    /// Booking date (YYYY-MM-DD, default: today).
    #[arg(long, value_parser = parse_date)]
    date: Option<NaiveDate>,
    /// Category name; auto-classified when omitted.
    #[arg(long)]
    category: Option<String>,
    /// Envelope category the transaction counts toward.
    #[arg(long, value_name = "CATEGORY_ID")]
    envelope: Option<BudgetCategoryId>,
}

/// Arguments for `tx list`.
#[derive(Debug, Args)]
struct TxListArgs {
    /// Start date (inclusive, YYYY-MM-DD). Requires --to.
    #[arg(long, requires = "to", value_parser = parse_date)]
    from: Option<NaiveDate>,
    /// End date (inclusive, YYYY-MM-DD). Requires --from.
    #[arg(long, requires = "from", value_parser = parse_date)]
    to: Option<NaiveDate>,
    /// Only this account.
    #[arg(long)]
    account: Option<AccountId>,
    /// Only this envelope category.
    #[arg(long, value_name = "CATEGORY_ID")]
    envelope: Option<BudgetCategoryId>,
    /// Only this direction.
    #[arg(long, value_parser = parse_kind)]
    kind: Option<TransactionKind>,
    /// Case-insensitive description substring.
    #[arg(long)]
    description: Option<String>,
}

/// Arguments for `tx edit`.
#[derive(Debug, Args)]
struct TxEditArgs {
    /// Transaction identifier.
    id: TransactionId,
    /// New amount.
    #[arg(long, value_parser = parse_amount)]
    amount: Option<Decimal>,
    /// New direction.
    #[arg(long, value_parser = parse_kind)]
    kind: Option<TransactionKind>,
    /// New booking date (YYYY-MM-DD).
    #[arg(long, value_parser = parse_date)]
    date: Option<NaiveDate>,
    /// New description.
    #[arg(long)]
    description: Option<String>,
    /// New category name.
    #[arg(long)]
    category: Option<String>,
    /// Link to another envelope category.
    #[arg(long, value_name = "CATEGORY_ID", conflicts_with = "unlink")]
    envelope: Option<BudgetCategoryId>,
    /// Remove the envelope link.
    #[arg(long)]
    unlink: bool,
}

/// `budget` subcommands.
#[derive(Debug, Subcommand)]
enum BudgetCommand {
    /// Allocate an amount to an envelope for one month.
    Set {
        /// Envelope category identifier.
        category: BudgetCategoryId,
        /// Calendar year.
        year: i32,
        /// Month number (1-12).
        month: u32,
        /// Amount to allocate.
        #[arg(value_parser = parse_amount)]
        amount: Decimal,
    },
    /// Show every envelope for one month (default: current month).
    Show {
        /// Calendar year.
        year: Option<i32>,
        /// Month number (1-12).
        month: Option<u32>,
    },
}

/// Arguments for `import`.
#[derive(Debug, Args)]
struct ImportArgs {
    /// JSON file holding an array of parsed rows.
    file: PathBuf,
    /// Target account.
    #[arg(long)]
    account: AccountId,
    /// Skip rows already present on the account.
    #[arg(long)]
    skip_duplicates: bool,
    /// chrono format tried before the built-in date formats.
    #[arg(long)]
    date_format: Option<String>,
    /// Envelope category every imported row counts toward.
    #[arg(long, value_name = "CATEGORY_ID")]
    envelope: Option<BudgetCategoryId>,
}

/// Arguments for `classify`.
#[derive(Debug, Args)]
struct ClassifyArgs {
    /// Description or payee.
    description: String,
    /// Amount.
    #[arg(long, default_value = "0", value_parser = parse_amount)]
    amount: Decimal,
    /// income, expense or transfer.
    #[arg(long, default_value = "expense", value_parser = parse_kind)]
    kind: TransactionKind,
    /// Ask the external model directly, bypassing cache and rules.
    #[arg(long)]
    external: bool,
}

/// Parses a date string in `YYYY-MM-DD` format for clap.
fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|err| format!("{err}"))
}

/// Parses a decimal amount for clap.
fn parse_amount(s: &str) -> Result<Decimal, String> {
    s.trim()
        .parse::<Decimal>()
        .map_err(|err| format!("invalid amount '{s}': {err}"))
}

/// Parses a transaction direction for clap.
fn parse_kind(s: &str) -> Result<TransactionKind, String> {
    s.parse::<TransactionKind>().map_err(|err| err.to_string())
}

/// Runs the CLI, returning an appropriate exit code.
fn run() -> io::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let _dotenv = dotenvy::dotenv();

    let cli = Cli::parse();

    let engine = match build_engine(cli.data_dir, cli.config) {
        Ok(engine) => engine,
        Err(err) => return report("failed to initialize", &err),
    };
    let runtime = Runtime::new()?;

    dispatch(&engine, &runtime, &cli.org, cli.command)
}

/// Creates the storage backend, using `data_dir` if provided or the
/// default XDG data directory otherwise.
fn create_store(data_dir: Option<PathBuf>) -> envelope_ledger::Result<FileStore> {
    let dir = match data_dir {
        Some(dir) => dir,
        None => FileStore::default_dir()?,
    };
    FileStore::new(dir)
}

/// Loads configuration from `path`, or from the environment without one.
fn load_config(path: Option<PathBuf>) -> envelope_ledger::Result<EngineConfig> {
    path.map_or_else(EngineConfig::from_env, EngineConfig::from_json_file)
}

/// Builds the external classifier when its URL is set in the environment.
fn external_classifier(config: &EngineConfig) -> envelope_ledger::Result<Option<HttpClassifier>> {
    let Some(url) = std::env::var(CLASSIFIER_URL_ENV)
        .ok()
        .filter(|url| !url.trim().is_empty())
    else {
        return Ok(None);
    };
    let key = std::env::var(CLASSIFIER_KEY_ENV).ok().ok_or_else(|| {
        LedgerError::Config(format!("{CLASSIFIER_KEY_ENV} must be set with {CLASSIFIER_URL_ENV}"))
    })?;
    HttpClassifier::builder()
        .base_url(url)
        .api_key(key)
        .timeout(config.classification.external_timeout())
        .build()
        .map(Some)
}

/// Assembles the engine from storage, configuration and environment.
fn build_engine(
    data_dir: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> envelope_ledger::Result<CliEngine> {
    let config = load_config(config_path)?;
    let external = external_classifier(&config)?;
    Engine::builder()
        .store(create_store(data_dir)?)
        .cache(InMemoryCache::new())
        .external_classifier(external)
        .config(config)
        .build()
}

/// Prints an error line and yields a failing exit code.
fn report(context: &str, err: &LedgerError) -> io::Result<ExitCode> {
    writeln!(
        io::stderr().lock(),
        "{} {context}: {err}",
        "error:".red().bold()
    )?;
    Ok(ExitCode::FAILURE)
}

/// Dispatches to the appropriate subcommand handler.
fn dispatch(
    engine: &CliEngine,
    runtime: &Runtime,
    org: &OrganizationId,
    command: Command,
) -> io::Result<ExitCode> {
    match command {
        Command::Account(AccountCommand::Add {
            name,
            currency,
            initial,
        }) => cmd_account_add(engine, org, &name, &currency, initial),
        Command::Account(AccountCommand::List) => cmd_account_list(engine, org),
        Command::Account(AccountCommand::Reconcile { id }) => cmd_reconcile(engine, org, &id),
        Command::Category(CategoryCommand::Add { name, group }) => {
            cmd_category_add(engine, org, &name, group.as_deref())
        }
        Command::Category(CategoryCommand::List) => cmd_category_list(engine, org),
        Command::Tx(TxCommand::Add(args)) => cmd_tx_add(engine, runtime, org, args),
        Command::Tx(TxCommand::List(args)) => cmd_tx_list(engine, org, &args),
        Command::Tx(TxCommand::Edit(args)) => cmd_tx_edit(engine, org, args),
        Command::Tx(TxCommand::Delete { id }) => cmd_tx_delete(engine, org, &id),
        Command::Budget(BudgetCommand::Set {
            category,
            year,
            month,
            amount,
        }) => cmd_budget_set(engine, org, &category, year, month, amount),
        Command::Budget(BudgetCommand::Show { year, month }) => {
            let today = Utc::now().date_naive();
            cmd_budget_show(
                engine,
                org,
                year.unwrap_or_else(|| today.year()),
                month.unwrap_or_else(|| today.month()),
            )
        }
        Command::Import(args) => cmd_import(engine, runtime, org, &args),
        Command::Batch { id } => cmd_batch(engine, org, &id),
        Command::Classify(args) => cmd_classify(engine, runtime, org, args),
    }
}

/// Executes `account add`.
fn cmd_account_add(
    engine: &CliEngine,
    org: &OrganizationId,
    name: &str,
    currency: &str,
    initial: Decimal,
) -> io::Result<ExitCode> {
    match engine.ledger().open_account(org, name, currency, initial) {
        Ok(account) => {
            writeln!(
                io::stdout().lock(),
                "{} {} {}",
                "Opened".green().bold(),
                account.name,
                format_args!("({})", account.id).dimmed()
            )?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => report("failed to open account", &err),
    }
}

/// Executes `account list`.
fn cmd_account_list(engine: &CliEngine, org: &OrganizationId) -> io::Result<ExitCode> {
    match engine.ledger().accounts(org) {
        Ok(accounts) => {
            print_accounts(&accounts)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => report("failed to read accounts", &err),
    }
}

/// Executes `account reconcile`.
fn cmd_reconcile(engine: &CliEngine, org: &OrganizationId, id: &AccountId) -> io::Result<ExitCode> {
    match engine.ledger().reconcile(org, id) {
        Ok(report_data) => {
            print_reconciliation(&report_data)?;
            Ok(if report_data.is_reconciled() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Err(err) => report("failed to reconcile account", &err),
    }
}

/// Executes `category add`.
fn cmd_category_add(
    engine: &CliEngine,
    org: &OrganizationId,
    name: &str,
    group: Option<&str>,
) -> io::Result<ExitCode> {
    match engine.budget().create_category(org, name, group) {
        Ok(category) => {
            writeln!(
                io::stdout().lock(),
                "{} {} {}",
                "Created".green().bold(),
                category.name,
                format_args!("({})", category.id).dimmed()
            )?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => report("failed to create category", &err),
    }
}

/// Executes `category list`.
fn cmd_category_list(engine: &CliEngine, org: &OrganizationId) -> io::Result<ExitCode> {
    match engine.budget().categories(org) {
        Ok(categories) => {
            print_categories(&categories)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => report("failed to read categories", &err),
    }
}

/// Builds a [`NewTransaction`] from `tx add` arguments.
fn new_transaction(org: &OrganizationId, args: TxAddArgs) -> NewTransaction {
    let date = args.date.unwrap_or_else(|| Utc::now().date_naive());
    let mut input = NewTransaction::new(
        org.clone(),
        args.account,
        args.kind,
        args.amount,
        date,
        args.description,
    );
    if let Some(category) = args.category {
        input = input.category(category);
    }
    if let Some(envelope) = args.envelope {
        input = input.budget_category(envelope);
    }
    input
}

/// Executes `tx add`.
fn cmd_tx_add(
    engine: &CliEngine,
    runtime: &Runtime,
    org: &OrganizationId,
    args: TxAddArgs,
) -> io::Result<ExitCode> {
    let input = new_transaction(org, args);
    match runtime.block_on(engine.ledger().create_transaction(input)) {
        Ok(tx) => {
            print_transactions(core::slice::from_ref(&tx))?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => report("failed to record transaction", &err),
    }
}

/// Builds a [`TransactionFilter`] from `tx list` arguments.
fn build_transaction_filter(args: &TxListArgs) -> TransactionFilter {
    let mut filter = TransactionFilter::new();
    if let Some((from_date, to_date)) = args.from.zip(args.to) {
        filter = filter.date_range(from_date, to_date);
    }
    if let Some(account) = args.account.as_ref() {
        filter = filter.account(account.clone());
    }
    if let Some(envelope) = args.envelope.as_ref() {
        filter = filter.budget_category(envelope.clone());
    }
    if let Some(kind) = args.kind {
        filter = filter.kind(kind);
    }
    if let Some(text) = args.description.as_deref() {
        filter = filter.description(text);
    }
    filter
}

/// Executes `tx list`.
fn cmd_tx_list(engine: &CliEngine, org: &OrganizationId, args: &TxListArgs) -> io::Result<ExitCode> {
    let filter = build_transaction_filter(args);
    match engine.ledger().transactions(org, &filter) {
        Ok(txs) => {
            print_transactions(&txs)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => report("failed to read transactions", &err),
    }
}

/// Builds a [`TransactionPatch`] from `tx edit` arguments.
fn build_patch(args: TxEditArgs) -> TransactionPatch {
    let mut patch = TransactionPatch::new();
    if let Some(amount) = args.amount {
        patch = patch.amount(amount);
    }
    if let Some(kind) = args.kind {
        patch = patch.kind(kind);
    }
    if let Some(date) = args.date {
        patch = patch.date(date);
    }
    if let Some(description) = args.description {
        patch = patch.description(description);
    }
    if let Some(category) = args.category {
        patch = patch.category(category);
    }
    if args.unlink {
        patch = patch.budget_category(None);
    } else if let Some(envelope) = args.envelope {
        patch = patch.budget_category(Some(envelope));
    }
    patch
}

/// Executes `tx edit`.
fn cmd_tx_edit(engine: &CliEngine, org: &OrganizationId, args: TxEditArgs) -> io::Result<ExitCode> {
    let id = args.id.clone();
    let patch = build_patch(args);
    match engine.ledger().update_transaction(org, &id, &patch) {
        Ok(tx) => {
            print_transactions(core::slice::from_ref(&tx))?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => report("failed to update transaction", &err),
    }
}

/// Executes `tx delete`.
fn cmd_tx_delete(engine: &CliEngine, org: &OrganizationId, id: &TransactionId) -> io::Result<ExitCode> {
    match engine.ledger().delete_transaction(org, id) {
        Ok(tx) => {
            writeln!(
                io::stdout().lock(),
                "{} {} {}",
                "Deleted".green().bold(),
                tx.description,
                format_args!("({} {})", tx.amount, tx.currency).dimmed()
            )?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => report("failed to delete transaction", &err),
    }
}

/// Executes `budget set`.
fn cmd_budget_set(
    engine: &CliEngine,
    org: &OrganizationId,
    category: &BudgetCategoryId,
    year: i32,
    month: u32,
    amount: Decimal,
) -> io::Result<ExitCode> {
    match engine
        .budget()
        .set_monthly_budget(org, category, year, month, amount)
    {
        Ok(row) => {
            writeln!(
                io::stdout().lock(),
                "{} {} {}",
                "Budgeted".green().bold(),
                format_args!("{:.2}", row.budgeted),
                format_args!(
                    "({}, available {:.2})",
                    row.period, row.available
                )
                .dimmed()
            )?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => report("failed to set budget", &err),
    }
}

/// Executes `budget show`.
fn cmd_budget_show(
    engine: &CliEngine,
    org: &OrganizationId,
    year: i32,
    month: u32,
) -> io::Result<ExitCode> {
    match engine.budget().get_monthly_budget(org, year, month) {
        Ok(lines) => {
            print_budget(year, month, &lines)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => report("failed to read budget", &err),
    }
}

/// Builds [`ImportOptions`] from `import` arguments.
fn import_options(args: &ImportArgs) -> ImportOptions {
    let mut options = ImportOptions::new().skip_duplicates(args.skip_duplicates);
    if let Some(format) = args.date_format.as_deref() {
        options = options.date_format(format);
    }
    if let Some(envelope) = args.envelope.as_ref() {
        options = options.budget_category(envelope.clone());
    }
    options
}

/// Executes `import`.
fn cmd_import(
    engine: &CliEngine,
    runtime: &Runtime,
    org: &OrganizationId,
    args: &ImportArgs,
) -> io::Result<ExitCode> {
    let raw = match fs::read_to_string(&args.file) {
        Ok(raw) => raw,
        Err(err) => {
            writeln!(
                io::stderr().lock(),
                "{} failed to read {}: {err}",
                "error:".red().bold(),
                args.file.display()
            )?;
            return Ok(ExitCode::FAILURE);
        }
    };
    let rows = match rows_from_json(&raw) {
        Ok(rows) => rows,
        Err(err) => return report("failed to parse rows", &err),
    };
    let options = import_options(args);
    match runtime.block_on(
        engine
            .importer()
            .import_rows(org, &args.account, &rows, &options),
    ) {
        Ok(result) => {
            print_import_result(&result)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => report("import failed", &err),
    }
}

/// Executes `batch`.
fn cmd_batch(engine: &CliEngine, org: &OrganizationId, id: &ImportBatchId) -> io::Result<ExitCode> {
    match engine.importer().batch(org, id) {
        Ok(batch) => {
            print_batch(&batch)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => report("failed to read batch", &err),
    }
}

/// Executes `classify`.
fn cmd_classify(
    engine: &CliEngine,
    runtime: &Runtime,
    org: &OrganizationId,
    args: ClassifyArgs,
) -> io::Result<ExitCode> {
    let input = ClassificationInput::new(args.description, args.amount, args.kind);
    let classifier = engine.classifier();
    let outcome = if args.external {
        runtime.block_on(classifier.request_external(org, &input))
    } else {
        Ok(runtime.block_on(classifier.classify(org, &input)))
    };
    match outcome {
        Ok(result) => {
            print_classification(&result)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => report("classification failed", &err),
    }
}

// ── Output formatting ────────────────────────────────────────────────

/// Placeholder for absent values.
const EMPTY: &str = "\u{2014}";

/// Creates a table with the house style and the given header.
fn styled_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    _ = table.load_preset(UTF8_FULL);
    _ = table.set_header(
        header
            .iter()
            .map(|title| Cell::new(title).fg(Color::Cyan))
            .collect::<Vec<_>>(),
    );
    table
}

/// Writes a titled table to stdout.
fn print_table(title: &str, count: usize, table: &Table) -> io::Result<()> {
    let mut out = io::stdout().lock();
    writeln!(
        out,
        "{} {}",
        title.green().bold(),
        format_args!("({count})").dimmed()
    )?;
    writeln!(out)?;
    writeln!(out, "{table}")?;
    Ok(())
}

/// Writes a dimmed "nothing here" line to stdout.
fn print_empty(message: &str) -> io::Result<()> {
    writeln!(io::stdout().lock(), "{}", message.dimmed())
}

/// Cell for a signed money amount: red below zero, green above.
fn money_cell(amount: Decimal) -> Cell {
    let cell = Cell::new(format!("{amount:.2}"));
    if amount.is_sign_negative() && !amount.is_zero() {
        cell.fg(Color::Red)
    } else if amount.is_zero() {
        cell.fg(Color::DarkGrey)
    } else {
        cell.fg(Color::Green)
    }
}

/// Table of accounts.
fn accounts_table(accounts: &[Account]) -> Table {
    let mut table = styled_table(&["Id", "Name", "Currency", "Balance"]);
    for account in accounts {
        _ = table.add_row(vec![
            Cell::new(&account.id).fg(Color::DarkGrey),
            Cell::new(&account.name),
            Cell::new(&account.currency),
            money_cell(account.balance),
        ]);
    }
    table
}

/// Prints accounts in a table.
fn print_accounts(accounts: &[Account]) -> io::Result<()> {
    if accounts.is_empty() {
        return print_empty("No accounts found.");
    }
    print_table("Accounts", accounts.len(), &accounts_table(accounts))
}

/// Table of envelope categories.
fn categories_table(categories: &[BudgetCategory]) -> Table {
    let mut table = styled_table(&["Id", "Name", "Group"]);
    for category in categories {
        _ = table.add_row(vec![
            Cell::new(&category.id).fg(Color::DarkGrey),
            Cell::new(&category.name),
            Cell::new(category.group.as_deref().unwrap_or(EMPTY)),
        ]);
    }
    table
}

/// Prints envelope categories in a table.
fn print_categories(categories: &[BudgetCategory]) -> io::Result<()> {
    if categories.is_empty() {
        return print_empty("No categories found.");
    }
    print_table("Categories", categories.len(), &categories_table(categories))
}

/// Table of transactions.
fn transactions_table(txs: &[Transaction]) -> Table {
    let mut table = styled_table(&["Date", "Description", "Amount", "Category", "Source", "Id"]);
    for tx in txs {
        let amount = Cell::new(format!("{:.2} {}", tx.amount, tx.currency));
        let amount_cell = match tx.kind {
            TransactionKind::Expense => amount.fg(Color::Red),
            TransactionKind::Income => amount.fg(Color::Green),
            TransactionKind::Transfer => amount.fg(Color::DarkGrey),
        };
        let source = tx
            .classification
            .as_ref()
            .map_or_else(|| EMPTY.to_owned(), |c| c.source.to_string());
        _ = table.add_row(vec![
            Cell::new(tx.date),
            Cell::new(&tx.description),
            amount_cell,
            Cell::new(tx.category.as_deref().unwrap_or(EMPTY)),
            Cell::new(source),
            Cell::new(&tx.id).fg(Color::DarkGrey),
        ]);
    }
    table
}

/// Prints transactions in a table.
fn print_transactions(txs: &[Transaction]) -> io::Result<()> {
    if txs.is_empty() {
        return print_empty("No transactions found.");
    }
    print_table("Transactions", txs.len(), &transactions_table(txs))
}

/// Table of one month's envelopes.
fn budget_table(lines: &[BudgetLine]) -> Table {
    let mut table = styled_table(&[
        "Category",
        "Group",
        "Budgeted",
        "Carryover",
        "Activity",
        "Available",
    ]);
    for line in lines {
        _ = table.add_row(vec![
            Cell::new(&line.category),
            Cell::new(line.group.as_deref().unwrap_or(EMPTY)),
            Cell::new(format!("{:.2}", line.budgeted)),
            Cell::new(format!("{:.2}", line.carryover)),
            Cell::new(format!("{:.2}", line.activity)),
            money_cell(line.available),
        ]);
    }
    table
}

/// Prints one month's envelopes in a table.
fn print_budget(year: i32, month: u32, lines: &[BudgetLine]) -> io::Result<()> {
    if lines.is_empty() {
        return print_empty("No categories found.");
    }
    let title = format!("Budget {year:04}-{month:02}");
    print_table(&title, lines.len(), &budget_table(lines))
}

/// Prints a reconciliation report.
fn print_reconciliation(report_data: &Reconciliation) -> io::Result<()> {
    let mut out = io::stdout().lock();
    if report_data.is_reconciled() {
        writeln!(out, "{}", "Balanced".green().bold())?;
    } else {
        writeln!(out, "{}", "Out of balance".red().bold())?;
    }
    writeln!(out)?;
    writeln!(out, "  {} {:.2}", "Recorded:".bold(), report_data.recorded_balance)?;
    writeln!(out, "  {} {:.2}", "Calculated:".bold(), report_data.calculated_balance)?;
    writeln!(out, "  {} {:.2}", "Difference:".bold(), report_data.difference)?;
    writeln!(out, "  {} {}", "Transactions:".bold(), report_data.transaction_count)?;
    Ok(())
}

/// Summary table of an import batch.
fn batch_table(batch: &ImportBatch) -> Table {
    let mut table = styled_table(&["Rows", "Count"]);
    let rows: &[(&str, usize)] = &[
        ("Total", batch.total_rows),
        ("Imported", batch.successful_rows),
        ("Skipped", batch.skipped_rows),
        ("Failed", batch.failed_rows),
    ];
    for &(name, count) in rows {
        let count_cell = if count > 0 {
            Cell::new(count).fg(Color::Green)
        } else {
            Cell::new(count).fg(Color::DarkGrey)
        };
        _ = table.add_row(vec![Cell::new(name), count_cell]);
    }
    table
}

/// Table of failed rows.
fn batch_errors_table(batch: &ImportBatch) -> Table {
    let mut table = styled_table(&["Row", "Error"]);
    for failure in &batch.errors {
        _ = table.add_row(vec![
            Cell::new(failure.row),
            Cell::new(&failure.error).fg(Color::Red),
        ]);
    }
    table
}

/// Prints an import batch with its failures.
fn print_batch(batch: &ImportBatch) -> io::Result<()> {
    let mut out = io::stdout().lock();
    writeln!(
        out,
        "{} {} {}",
        "Batch".green().bold(),
        batch.status,
        format_args!("({})", batch.id).dimmed()
    )?;
    writeln!(out)?;
    writeln!(out, "{}", batch_table(batch))?;
    if !batch.errors.is_empty() {
        writeln!(out, "{}", batch_errors_table(batch))?;
    }
    Ok(())
}

/// Prints the outcome of an import run.
fn print_import_result(result: &ImportResult) -> io::Result<()> {
    print_batch(&result.batch)?;
    if !result.created.is_empty() {
        writeln!(io::stdout().lock())?;
        print_transactions(&result.created)?;
    }
    Ok(())
}

/// Prints a classification result in a human-readable format.
fn print_classification(result: &ClassificationResult) -> io::Result<()> {
    let mut out = io::stdout().lock();
    writeln!(out, "{}", "Classification".green().bold())?;
    writeln!(out)?;
    writeln!(out, "  {} {}", "Category:".bold(), result.category)?;
    if let Some(subcategory) = result.subcategory.as_deref() {
        writeln!(out, "  {} {subcategory}", "Subcategory:".bold())?;
    }
    if let Some(merchant) = result.merchant_name.as_deref() {
        writeln!(out, "  {} {merchant}", "Merchant:".bold())?;
    }
    if let Some(frequency) = result.recurring_frequency {
        writeln!(out, "  {} {frequency}", "Recurring:".bold())?;
    }
    writeln!(out, "  {} {:.2}", "Confidence:".bold(), result.confidence)?;
    writeln!(out, "  {} {}", "Source:".bold(), result.source)?;
    Ok(())
}

/// Entry point.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            // Last-resort error output; if stderr itself failed there is
            // nothing left to do.
            let _ignored = writeln!(io::stderr(), "fatal I/O error: {err}");
            ExitCode::FAILURE
        }
    }
}

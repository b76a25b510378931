//! Influx CLI - analyze quarterly patient influx CSV files
//!
//! # Main Commands
//!
//! ```bash
//! influx serve                           # Start HTTP server (port 3000)
//! influx report patients.csv -D ER,ICU   # Dashboard numbers for a selection
//! influx export patients.csv -o out.csv  # Filtered, cleaned CSV
//! ```
//!
//! # Debug Commands (for development)
//!
//! ```bash
//! influx inspect patients.csv            # Encoding, delimiter, column binding
//! influx clean patients.csv              # Cleaned rows plus drop report
//! influx validate records.json           # Validate JSON records against schema
//! ```

use clap::{Args, Parser, Subcommand};
use influx::api::logs::LOG_BROADCASTER;
use influx::present::pivot_table;
use influx::{
    detect_columns, is_supported_delimiter, parse_file_auto, validate_records, AggregateResult, CleanOptions, ColumnOverrides,
    FilterSelection, LoadOptions, MissingValuePolicy, Quarter, ServerConfig, Session,
};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "influx")]
#[command(about = "Analyze quarterly hospital patient influx CSV files", long_about = None)]
struct Cli {
    /// Silence progress logs on stderr
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show detected encoding, delimiter and column binding
    Inspect {
        /// Input CSV file
        input: PathBuf,
    },

    /// Clean a CSV and output the cleaned rows as CSV
    Clean {
        /// Input CSV file
        input: PathBuf,

        #[command(flatten)]
        load: LoadArgs,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write the drop report as JSON to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Aggregate a selection and print dashboard numbers
    Report {
        /// Input CSV file
        input: PathBuf,

        #[command(flatten)]
        load: LoadArgs,

        #[command(flatten)]
        selection: SelectionArgs,

        /// Print the full dashboard view as JSON
        #[arg(long)]
        json: bool,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Export the cleaned rows of a selection as CSV
    Export {
        /// Input CSV file
        input: PathBuf,

        #[command(flatten)]
        load: LoadArgs,

        #[command(flatten)]
        selection: SelectionArgs,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate JSON records against the patient record schema
    Validate {
        /// Input JSON file (array of records)
        input: PathBuf,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on (default: INFLUX_PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

/// How to read and clean the input file.
#[derive(Args)]
struct LoadArgs {
    /// CSV delimiter: , ; | or \t (auto-detect if not specified)
    #[arg(short, long, value_parser = parse_delimiter)]
    delimiter: Option<char>,

    /// Header of the department column
    #[arg(long)]
    department_column: Option<String>,

    /// Header of the quarter column
    #[arg(long)]
    quarter_column: Option<String>,

    /// Header of the year column
    #[arg(long)]
    year_column: Option<String>,

    /// Header of the patient count column
    #[arg(long)]
    patient_count_column: Option<String>,

    /// Keep rows with a missing patient count as zero instead of dropping them
    #[arg(long)]
    impute_zero: bool,
}

impl From<LoadArgs> for LoadOptions {
    fn from(args: LoadArgs) -> Self {
        LoadOptions {
            delimiter: args.delimiter,
            overrides: ColumnOverrides {
                department: args.department_column,
                quarter: args.quarter_column,
                year: args.year_column,
                patient_count: args.patient_count_column,
            },
            clean: CleanOptions {
                missing_patient_count: if args.impute_zero {
                    MissingValuePolicy::Zero
                } else {
                    MissingValuePolicy::Drop
                },
            },
        }
    }
}

/// Which rows to aggregate or export.
#[derive(Args)]
struct SelectionArgs {
    /// Departments to include, comma separated (default: all)
    #[arg(short = 'D', long, value_delimiter = ',')]
    departments: Vec<String>,

    /// First year (inclusive)
    #[arg(long)]
    from_year: Option<i32>,

    /// Last year (inclusive)
    #[arg(long)]
    to_year: Option<i32>,

    /// First quarter of each year (inclusive)
    #[arg(long, value_parser = parse_quarter)]
    from_quarter: Option<Quarter>,

    /// Last quarter of each year (inclusive)
    #[arg(long, value_parser = parse_quarter)]
    to_quarter: Option<Quarter>,
}

impl From<SelectionArgs> for FilterSelection {
    fn from(args: SelectionArgs) -> Self {
        let base = if args.departments.is_empty() {
            FilterSelection::all()
        } else {
            FilterSelection::for_departments(&args.departments)
        };
        base.with_years(args.from_year, args.to_year)
            .with_quarters(args.from_quarter, args.to_quarter)
    }
}

fn parse_quarter(value: &str) -> Result<Quarter, String> {
    Quarter::from_label(value).ok_or_else(|| format!("'{}' is not a quarter (Q1-Q4)", value))
}

fn parse_delimiter(value: &str) -> Result<char, String> {
    let delimiter = match value {
        "\\t" | "tab" => '\t',
        other => {
            let mut chars = other.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => c,
                _ => return Err(format!("'{}' is not a single character", value)),
            }
        }
    };
    if is_supported_delimiter(delimiter) {
        Ok(delimiter)
    } else {
        Err(format!("'{}' is not a supported delimiter (use , ; | or \\t)", value))
    }
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    if cli.quiet {
        LOG_BROADCASTER.set_echo(false);
    }

    let result = match cli.command {
        Commands::Inspect { input } => cmd_inspect(&input),

        Commands::Clean {
            input,
            load,
            output,
            report,
        } => cmd_clean(&input, load.into(), output.as_deref(), report.as_deref()),

        Commands::Report {
            input,
            load,
            selection,
            json,
            output,
        } => cmd_report(&input, load.into(), selection.into(), json, output.as_deref()),

        Commands::Export {
            input,
            load,
            selection,
            output,
        } => cmd_export(&input, load.into(), selection.into(), output.as_deref()),

        Commands::Validate { input } => cmd_validate(&input),

        Commands::Serve { port } => cmd_serve(port).await,
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_inspect(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Inspecting: {}", input.display());

    let table = parse_file_auto(input)?;

    println!("Encoding:  {}", table.encoding);
    println!("Delimiter: '{}'", format_delimiter(table.delimiter));
    println!("Rows:      {}", table.rows.len());
    println!("Columns:   {}", table.headers.join(", "));
    println!();

    let bound = detect_columns(&table.headers);
    for field in influx::Field::ALL {
        match bound.iter().find(|(f, _)| *f == field) {
            Some((_, idx)) => println!("  {:<14} ← {}", field.column_name(), table.headers[*idx]),
            None => println!("  {:<14} ← (not found)", field.column_name()),
        }
    }

    Ok(())
}

fn load(input: &Path, options: &LoadOptions) -> Result<Session, Box<dyn std::error::Error>> {
    let mut session = Session::new();
    session.load_file(input, options)?;
    Ok(session)
}

fn cmd_clean(
    input: &Path,
    options: LoadOptions,
    output: Option<&Path>,
    report_path: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = load(input, &options)?;

    if let Some(path) = report_path {
        let report = session.report().ok_or("No dataset loaded")?;
        fs::write(path, serde_json::to_string_pretty(report)?)?;
        eprintln!("💾 Report written to: {}", path.display());
    }

    write_output(&session.export_csv()?, output)
}

fn cmd_report(
    input: &Path,
    options: LoadOptions,
    selection: FilterSelection,
    json: bool,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = load(input, &options)?;
    session.select(selection);

    if json {
        let view = session.view()?;
        return write_output(&serde_json::to_string_pretty(&view)?, output);
    }

    let text = match session.aggregate()? {
        Ok(result) => render_report(&result),
        Err(empty) => format!("{}\n", empty),
    };
    write_output(&text, output)
}

/// Plain-text dashboard: headline numbers, ranking, pivot and changes.
fn render_report(result: &AggregateResult) -> String {
    let mut out = String::new();
    let summary = &result.summary;

    out.push_str(&format!(
        "Total patients: {}   Departments: {}   Years: {}   Data points: {}\n\n",
        summary.total_patients, summary.departments, summary.years, summary.data_points
    ));

    out.push_str("Departments by total\n");
    for (rank, total) in result.ranked().iter().enumerate() {
        out.push_str(&format!("  {:>2}. {:<24} {:>10}\n", rank + 1, total.department, total.total));
    }

    let pivot = pivot_table(result);
    out.push_str(&format!("\n{:<6}", "Year"));
    for column in &pivot.columns {
        out.push_str(&format!("{:>10}", column));
    }
    out.push('\n');
    for row in &pivot.rows {
        out.push_str(&format!("{:<6}", row.year));
        for value in row.values {
            out.push_str(&format!("{:>10}", value));
        }
        out.push('\n');
    }

    if !result.quarter_changes.is_empty() {
        out.push_str("\nQuarter over quarter\n");
        for change in &result.quarter_changes {
            out.push_str(&format!(
                "  {:<24} {}  {:>8} → {:<8} {}\n",
                change.department,
                change.period.label(),
                change.previous,
                change.current,
                change.change
            ));
        }
    }

    if !result.year_changes.is_empty() {
        out.push_str("\nYear over year\n");
        for change in &result.year_changes {
            out.push_str(&format!(
                "  {:<24} {}     {:>8} → {:<8} {}\n",
                change.department, change.year, change.previous, change.current, change.change
            ));
        }
    }

    out
}

fn cmd_export(
    input: &Path,
    options: LoadOptions,
    selection: FilterSelection,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = load(input, &options)?;
    session.select(selection);
    write_output(&session.export_csv()?, output)
}

fn cmd_validate(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("✔️  Validating: {}", input.display());

    let content = fs::read_to_string(input)?;
    let records: Vec<Value> = serde_json::from_str(&content)?;

    let (valid, invalid, errors) = validate_records(&records, 5);
    for (i, errs) in &errors {
        eprintln!("\n❌ Record {} invalid:", i);
        for err in errs.iter().take(3) {
            eprintln!("   - {}", err);
        }
    }

    eprintln!("\n📊 Results: {} valid, {} invalid", valid, invalid);

    if invalid > 0 {
        std::process::exit(1);
    }

    Ok(())
}

async fn cmd_serve(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::from_env().with_port(port);
    influx::server::start_server(config).await?;
    Ok(())
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            print!("{}", content);
        }
    }
    Ok(())
}

use std::path::PathBuf;

use crate::prelude::*;
use crate::prelude::{eprintln, println};
use clap::Parser;
use colored::Colorize;

mod output;
mod prelude;

#[derive(Debug, clap::Parser)]
#[command(
    author,
    version,
    about,
    long_about = "Convert French bank statement PDFs into normalized transaction tables"
)]
pub struct App {
    #[command(subcommand)]
    pub command: SubCommands,
}

#[derive(Debug, clap::Parser)]
pub enum SubCommands {
    /// Identify the issuing bank of a statement PDF
    Detect(DetectOptions),

    /// Extract the transaction table from a statement PDF
    Parse(ParseOptions),

    /// Dump the raw text extraction (diagnostic)
    Text(TextOptions),
}

#[derive(Debug, clap::Args)]
pub struct DetectOptions {
    /// Path to the statement PDF
    file: PathBuf,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, clap::Args)]
pub struct ParseOptions {
    /// Path to the statement PDF
    file: PathBuf,

    /// Bank id (bnp, lcl, banque-populaire, qonto, societe-generale, cic).
    /// Auto-detected when omitted.
    #[arg(short, long, env = "RELEVE_BANK")]
    bank: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    format: output::Format,
}

#[derive(Debug, clap::Args)]
pub struct TextOptions {
    /// Path to the statement PDF
    file: PathBuf,

    /// Dump positioned lines as JSON instead of the flat text
    #[arg(long)]
    lines: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    color_eyre::install()?;

    let app = App::parse();

    match app.command {
        SubCommands::Detect(options) => run_detect(options),
        SubCommands::Parse(options) => run_parse(options),
        SubCommands::Text(options) => run_text(options),
    }
}

fn read_statement(file: &PathBuf) -> Result<Vec<u8>> {
    std::fs::read(file).with_context(|| format!("reading {}", file.display()))
}

fn run_detect(options: DetectOptions) -> Result<()> {
    let bytes = read_statement(&options.file)?;
    let bank_id = releve_core::detect(&bytes)?;

    if options.json {
        println!("{}", serde_json::json!({ "bankId": bank_id }));
    } else {
        match bank_id {
            Some(id) => println!("{}", id.green().bold()),
            None => println!("{}", "unknown".yellow()),
        }
    }

    Ok(())
}

fn run_parse(options: ParseOptions) -> Result<()> {
    let bytes = read_statement(&options.file)?;

    let bank_id = match options.bank {
        Some(id) => id,
        None => releve_core::detect(&bytes)?
            .ok_or_eyre("could not identify the issuing bank; pass --bank")?
            .to_string(),
    };

    let transactions = match releve_core::parse(&bytes, &bank_id) {
        Ok(transactions) => transactions,
        Err(err) => {
            // PDF_TEXT_DEBUG=1 turns a parse failure into a text dump so the
            // extraction can be inspected.
            if text_debug_enabled() {
                if let releve_core::ParseError::ParseFailed {
                    extracted_text: Some(text),
                    ..
                } = &err
                {
                    eprintln!("{}", "--- extracted text ---".dimmed());
                    println!("{text}");
                }
            }
            return Err(eyre!(err));
        }
    };

    output::render(&transactions, options.format)
}

fn run_text(options: TextOptions) -> Result<()> {
    let bytes = read_statement(&options.file)?;

    if options.lines {
        let lines = releve_pdf::extract_positioned_lines(&bytes)?;
        println!("{}", serde_json::to_string_pretty(&lines)?);
    } else {
        println!("{}", releve_pdf::extract_flat_text(&bytes)?);
    }

    Ok(())
}

fn text_debug_enabled() -> bool {
    std::env::var("PDF_TEXT_DEBUG").as_deref() == Ok("1")
}

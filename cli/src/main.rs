//! repdf CLI - PDF text-layer redaction tool

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use regex::Regex;

use repdf::{LopdfBackend, RedactionConfig, RedactionReport, Redactor};

#[derive(Parser)]
#[command(name = "repdf")]
#[command(version)]
#[command(about = "Redact text, metadata, and XMP from PDF files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Redact a PDF
    Redact {
        /// Input PDF file ("-" for stdin)
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output file (stdout if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Content rule as PATTERN=REPLACEMENT (repeatable, applied in order)
        #[arg(short, long = "replace", value_name = "PATTERN=TEXT")]
        replace: Vec<String>,

        /// Delete every Info field without a specific rule
        #[arg(long)]
        clear_metadata: bool,

        /// Strip the XMP metadata packet
        #[arg(long)]
        remove_xmp: bool,

        /// Fallback glyphs for characters missing from a font
        #[arg(long, value_name = "CHARS")]
        fallback_glyphs: Option<String>,

        /// Print a JSON report to stderr
        #[arg(long)]
        report: bool,
    },

    /// Show document metadata
    Info {
        /// Input PDF file
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Show version information
    Version,
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Redact {
            input,
            output,
            replace,
            clear_metadata,
            remove_xmp,
            fallback_glyphs,
            report,
        } => cmd_redact(
            &input,
            output.as_deref(),
            &replace,
            clear_metadata,
            remove_xmp,
            fallback_glyphs.as_deref(),
            report,
        ),
        Commands::Info { input } => cmd_info(&input),
        Commands::Version => {
            cmd_version();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

/// Split a `PATTERN=REPLACEMENT` rule at the first `=`.
fn parse_rule(rule: &str) -> Result<(Regex, String), Box<dyn std::error::Error>> {
    let (pattern, replacement) = rule
        .split_once('=')
        .ok_or_else(|| format!("rule '{}' is missing '=': expected PATTERN=TEXT", rule))?;
    let regex = Regex::new(pattern).map_err(|e| format!("invalid pattern '{}': {}", pattern, e))?;
    Ok((regex, replacement.to_string()))
}

fn read_input(input: &Path) -> io::Result<Vec<u8>> {
    if input == Path::new("-") {
        let mut data = Vec::new();
        io::stdin().lock().read_to_end(&mut data)?;
        Ok(data)
    } else {
        fs::read(input)
    }
}

fn cmd_redact(
    input: &Path,
    output: Option<&Path>,
    rules: &[String],
    clear_metadata: bool,
    remove_xmp: bool,
    fallback_glyphs: Option<&str>,
    report: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = RedactionConfig::new();
    for rule in rules {
        let (pattern, replacement) = parse_rule(rule)?;
        config = config.replace_text(pattern, replacement);
    }
    if clear_metadata {
        config = config.clear_metadata();
    }
    if remove_xmp {
        config = config.remove_xmp();
    }
    if let Some(glyphs) = fallback_glyphs {
        config = config.with_replacement_glyphs(glyphs.chars().collect::<Vec<char>>());
    }

    let data = read_input(input)?;
    let (out, result) = Redactor::new(config).redact_bytes(&data)?;

    match output {
        Some(path) => {
            fs::write(path, &out)?;
            eprintln!("{} {}", "Saved to".green(), path.display());
        }
        None => {
            let stdout = io::stdout();
            stdout.lock().write_all(&out)?;
        }
    }

    if report {
        eprintln!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result);
    }
    Ok(())
}

fn print_summary(report: &RedactionReport) {
    eprintln!(
        "{} {} replacements on {} of {} pages, {} metadata fields changed",
        "Done!".green().bold(),
        report.text_replacements,
        report.pages_changed,
        report.pages,
        report.metadata_edited + report.metadata_deleted,
    );
    if report.xmp_removed {
        eprintln!("  XMP metadata removed");
    }
    if report.glyph_failures > 0 {
        eprintln!(
            "{} {} characters had no renderable fallback glyph",
            "Warning:".yellow(),
            report.glyph_failures
        );
    }
    for font in &report.assumed_fonts {
        eprintln!(
            "{} font {} has no parsable encoding data",
            "Warning:".yellow(),
            font
        );
    }
}

fn cmd_info(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let data = read_input(input)?;
    let format = repdf::detect_format_from_bytes(&data)?;
    let backend = LopdfBackend::load_bytes(&data)?;

    println!("{}", "Document Information".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());
    println!("{}: {}", "File".bold(), input.display());
    println!("{}: {}", "Format".bold(), format);
    println!(
        "{}: {}",
        "Pages".bold(),
        repdf::DocumentBackend::pages(&backend).len()
    );

    let fields = repdf::DocumentBackend::info_fields(&backend)?;
    for (key, bytes) in fields {
        let value = repdf::metadata::decode_pdf_string(&bytes)?;
        println!("{}: {}", key.bold(), value);
    }
    Ok(())
}

fn cmd_version() {
    println!("{} {}", "repdf".cyan().bold(), env!("CARGO_PKG_VERSION"));
    println!("PDF text-layer redaction tool");
    println!("License: MIT");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rule_splits_on_first_equals() {
        let (pattern, replacement) = parse_rule(r"a=b=c").unwrap();
        assert_eq!(pattern.as_str(), "a");
        assert_eq!(replacement, "b=c");
    }

    #[test]
    fn test_parse_rule_rejects_missing_equals() {
        assert!(parse_rule("no-separator").is_err());
    }

    #[test]
    fn test_parse_rule_rejects_bad_pattern() {
        assert!(parse_rule("[=x").is_err());
    }
}

//! restyle CLI - byte-stable Word document restyling
//!
//! Applies classifier roles to a target document using the styles of an
//! architect document, leaving every other byte of the package intact.

use clap::{Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use restyle::registry::{ClassificationSet, RoleRegistry};
use restyle::{AuditLog, OoxmlContainer, ParagraphSummary, RestyleOptions, Restyler};
use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Byte-stable style reassignment for Word documents
#[derive(Parser)]
#[command(
    name = "restyle",
    author = "iyulab",
    version,
    about = "Restyle Word documents from classifier roles",
    long_about = "restyle - Byte-stable style reassignment for Word documents.\n\n\
                  Imports the styles a role registry maps to from an architect document\n\
                  and applies them to classified paragraphs of a target document."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply classifications to a target document
    Apply {
        /// Target document
        target: PathBuf,

        /// Architect document providing styles and environment
        #[arg(short, long)]
        architect: PathBuf,

        /// Role registry JSON
        #[arg(short, long)]
        registry: PathBuf,

        /// Classifications JSON
        #[arg(short, long)]
        classifications: PathBuf,

        /// Output document (an audit log is written next to it)
        #[arg(short, long)]
        output: PathBuf,

        /// Write the run report as JSON
        #[arg(long)]
        report: Option<PathBuf>,

        /// Keep the target theme
        #[arg(long)]
        no_theme: bool,

        /// Keep the target compat settings
        #[arg(long)]
        no_settings: bool,

        /// Keep the target font table
        #[arg(long)]
        no_font_table: bool,

        /// Keep the target document defaults
        #[arg(long)]
        no_doc_defaults: bool,

        /// Require styles to exist in the target instead of importing them
        #[arg(long)]
        no_style_import: bool,

        /// Skip the run-property stability check
        #[arg(long)]
        no_run_property_check: bool,
    },

    /// Check classifications against a registry and a target
    Preflight {
        /// Target document
        target: PathBuf,

        /// Role registry JSON
        #[arg(short, long)]
        registry: PathBuf,

        /// Classifications JSON
        #[arg(short, long)]
        classifications: PathBuf,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List body paragraphs with the indices classifiers use
    #[command(visible_alias = "ls")]
    Paragraphs {
        /// Target document
        target: PathBuf,

        /// Output JSON instead of a table
        #[arg(long)]
        json: bool,

        /// Maximum characters of text shown per paragraph
        #[arg(long, default_value = "60")]
        width: usize,
    },

    /// Show version information
    Version,
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Apply {
            target,
            architect,
            registry,
            classifications,
            output,
            report,
            no_theme,
            no_settings,
            no_font_table,
            no_doc_defaults,
            no_style_import,
            no_run_property_check,
        } => {
            let pb = create_spinner("Loading registry and classifications...");

            let registry = RoleRegistry::load(&registry)?;
            let classifications = ClassificationSet::load(&classifications)?;
            let options = RestyleOptions::new()
                .with_theme(!no_theme)
                .with_settings(!no_settings)
                .with_font_table(!no_font_table)
                .with_doc_defaults(!no_doc_defaults)
                .with_style_import(!no_style_import)
                .with_run_property_check(!no_run_property_check);
            log::debug!("Restyle options: {:?}", options);

            pb.set_message("Restyling document...");
            let mut log = AuditLog::new();
            let result = Restyler::new(registry, classifications)
                .with_options(options)
                .run(&target, &architect, &output, &mut log);

            pb.finish_and_clear();
            let log_file = log_path(&output);
            log.write_to(&log_file)?;
            let summary = result?;

            if let Some(path) = report {
                fs::write(&path, serde_json::to_string_pretty(&summary)?)?;
            }

            let changed = summary
                .outcomes
                .iter()
                .filter(|o| {
                    matches!(
                        o,
                        restyle::docx::ParagraphOutcome::StyleAssigned { changed: true, .. }
                    )
                })
                .count();
            println!(
                "{} Restyled {} paragraph(s), imported {} style(s): {}",
                "✓".green().bold(),
                changed,
                summary.imported_styles.len(),
                output.display()
            );
            if log.warning_count() > 0 {
                println!(
                    "{} {} warning(s); see {}",
                    "!".yellow().bold(),
                    log.warning_count(),
                    log_file.display()
                );
            }
        }

        Commands::Preflight {
            target,
            registry,
            classifications,
            output,
        } => {
            let report = restyle::preflight_file(&target, &registry, &classifications)?;
            write_output(output.as_ref(), &report.to_json()?)?;

            if report.is_clean() {
                eprintln!("{} Preflight passed", "✓".green().bold());
            } else {
                eprintln!(
                    "{} Preflight found {} unmapped role(s), {} out-of-range and {} duplicate index(es)",
                    "!".yellow().bold(),
                    report.unmapped_roles.len(),
                    report.out_of_range.len(),
                    report.duplicates.len()
                );
                std::process::exit(2);
            }
        }

        Commands::Paragraphs {
            target,
            json,
            width,
        } => {
            let container = OoxmlContainer::open(&target)?;
            let paragraphs = restyle::list_paragraphs(&container)?;

            if json {
                write_output(None, &serde_json::to_string_pretty(&paragraphs)?)?;
            } else {
                print_paragraphs(&paragraphs, width);
            }
        }

        Commands::Version => {
            print_version();
        }
    }

    Ok(())
}

/// `<output>.log`
fn log_path(output: &Path) -> PathBuf {
    let mut name = OsString::from(output.as_os_str());
    name.push(".log");
    PathBuf::from(name)
}

fn preview(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
        cut.push('…');
        cut
    }
}

fn print_paragraphs(paragraphs: &[ParagraphSummary], width: usize) {
    println!(
        "{}",
        format!("{:>5}  {:<24} {:<8} {}", "#", "Style", "Num", "Text")
            .cyan()
            .bold()
    );
    println!("{}", "─".repeat(44 + width.min(60)));
    for p in paragraphs {
        let numbering = match (&p.num_id, &p.level) {
            (Some(id), Some(level)) => format!("{}:{}", id, level),
            (Some(id), None) => id.clone(),
            _ => String::new(),
        };
        let line = format!(
            "{:>5}  {:<24} {:<8} {}",
            p.index,
            p.style_id.as_deref().unwrap_or("-"),
            numbering,
            preview(&p.text, width)
        );
        if p.has_section_properties {
            println!("{} {}", line.dimmed(), "[sectPr]".yellow());
        } else {
            println!("{}", line);
        }
    }
}

fn version_details() -> String {
    "Byte-stable style reassignment for Word documents\n\nSupported formats: DOCX, DOTX, DOCM, DOTM"
        .to_string()
}

fn print_version() {
    println!("{} {}", "restyle".green().bold(), env!("CARGO_PKG_VERSION"));
    println!("{}", version_details());
}

fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
            .template("{spinner:.blue} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn write_output(path: Option<&PathBuf>, content: &str) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            writeln!(handle, "{}", content)?;
        }
    }
    Ok(())
}

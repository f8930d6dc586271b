//! clausecut CLI - contract clause segmentation tool
//!
//! Splits plain-text contracts into title, clauses, signature block and
//! attachments, using an OpenAI-compatible model or the offline rules.

mod offline;
mod openai;

use clap::{Args, Parser, Subcommand};
use clausecut::normalize::split_text;
use clausecut::rules::{default_tail_boundary_rules, rules_from_path};
use clausecut::{BackoffClassifier, Classifier, Clausecut, ExtractionOutcome};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use offline::OfflineClassifier;
use openai::{ApiConfig, OpenAiClassifier};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// Contract text segmentation into clauses, signature block and attachments
#[derive(Parser)]
#[command(
    name = "clausecut",
    author = "iyulab",
    version,
    about = "Split contract text into clauses, signature block and attachments",
    long_about = "clausecut - Contract clause segmentation tool.\n\n\
                  Splits extracted contract text on clause markers and separates\n\
                  the signature block and attachments from the last clause.\n\n\
                  Usage:\n  \
                  clausecut split <file>            Full pipeline, JSON to stdout\n  \
                  clausecut split <file> --offline  Rules only, no model calls\n  \
                  clausecut candidates <file>       Show boundary candidates"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Show debug logs
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Show errors only
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a contract into title, clauses, signature and attachments
    Split {
        /// Input text file ("-" for stdin)
        input: PathBuf,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output compact JSON (no indentation)
        #[arg(long)]
        compact: bool,

        /// Keep the signature block and attachments inside the last clause
        #[arg(long)]
        no_tail_audit: bool,

        /// Skip the clause boundary repair pass
        #[arg(long)]
        no_merge: bool,

        #[command(flatten)]
        classifier: ClassifierArgs,
    },

    /// Split a tail window into last clause, signature and attachments
    Tail {
        /// Input text file ("-" for stdin)
        input: PathBuf,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output compact JSON (no indentation)
        #[arg(long)]
        compact: bool,

        #[command(flatten)]
        classifier: ClassifierArgs,
    },

    /// Show boundary candidates and the numbered audit context
    Candidates {
        /// Input text file ("-" for stdin)
        input: PathBuf,

        /// Boundary rule table (JSON)
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Print the audit context as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the default boundary rule table as JSON
    Rules {
        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show version information
    Version,
}

/// Classifier selection shared by the classifier-backed commands
#[derive(Args)]
struct ClassifierArgs {
    /// Use the rule candidates as-is instead of calling a model
    #[arg(long)]
    offline: bool,

    /// Extra attempts after an unusable model reply
    #[arg(long)]
    max_retries: Option<usize>,

    /// Boundary rule table (JSON)
    #[arg(long)]
    rules: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.quiet, cli.verbose) {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }

    if let Err(e) = run(cli) {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(quiet: bool, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_env("CLAUSECUT_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init()
        .map_err(|e| format!("failed to initialize tracing subscriber: {e}"))?;
    Ok(())
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Split {
            input,
            output,
            compact,
            no_tail_audit,
            no_merge,
            classifier,
        } => {
            let lines = read_lines(&input)?;
            let mut pipeline = build_pipeline(&classifier)?;
            if no_tail_audit {
                pipeline = pipeline.without_tail_audit();
            }
            if no_merge {
                pipeline = pipeline.without_clause_merge();
            }
            let model: Box<dyn Classifier> = if pipeline.options().uses_classifier() {
                create_classifier(&classifier)?
            } else {
                Box::new(OfflineClassifier)
            };

            let pb = (!cli.quiet && pipeline.options().uses_classifier())
                .then(|| create_spinner("Splitting contract..."));
            let outcome = pipeline.extract(&lines, &*model);
            if let Some(pb) = pb {
                pb.finish_and_clear();
            }

            write_output(output.as_ref(), &to_json(&outcome, compact)?)?;
            report_outcome(&outcome, output.as_deref());
        }

        Commands::Tail {
            input,
            output,
            compact,
            classifier,
        } => {
            let lines = read_lines(&input)?;
            let pipeline = build_pipeline(&classifier)?;
            let model = create_classifier(&classifier)?;

            let pb = (!cli.quiet).then(|| create_spinner("Auditing tail..."));
            let tail = pipeline.split_tail(&lines, &*model);
            if let Some(pb) = pb {
                pb.finish_and_clear();
            }
            let tail = tail?;

            write_output(output.as_ref(), &to_json(&tail, compact)?)?;
            if !tail.warnings.is_empty() {
                eprintln!("{} Needs human review", "!".yellow().bold());
            }
            if let Some(path) = output {
                println!("{} Tail split: {}", "✓".green().bold(), path.display());
            }
        }

        Commands::Candidates { input, rules, json } => {
            let lines = read_lines(&input)?;
            let mut pipeline = Clausecut::new();
            if let Some(path) = rules {
                pipeline = pipeline.with_rules(rules_from_path(path)?)?;
            }

            let context = match pipeline.last_clause_context(&lines) {
                Some(context) => context,
                None => {
                    eprintln!(
                        "{} No clause markers, auditing the whole text",
                        "!".yellow().bold()
                    );
                    pipeline.auditor().context(&lines)
                }
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&context)?);
                return Ok(());
            }

            println!("{}", "Boundary Candidates".cyan().bold());
            println!("{}", "─".repeat(40));
            if context.candidates.is_empty() {
                println!("  (none)");
            }
            for candidate in &context.candidates {
                println!(
                    "  {:<16} line {:>4}  score {}  -> {}",
                    candidate.id.bold(),
                    candidate.line_index + 1,
                    candidate.score,
                    candidate.section_name
                );
            }
            println!("\n{}", "Audit Context".cyan().bold());
            println!("{}", "─".repeat(40));
            println!("{}", context.numbered_text);
        }

        Commands::Rules { output } => {
            let json = serde_json::to_string_pretty(&default_tail_boundary_rules())?;
            write_output(output.as_ref(), &json)?;
        }

        Commands::Version => {
            print_version();
        }
    }

    Ok(())
}

fn build_pipeline(args: &ClassifierArgs) -> Result<Clausecut, Box<dyn std::error::Error>> {
    let mut pipeline = Clausecut::new();
    if let Some(path) = &args.rules {
        pipeline = pipeline.with_rules(rules_from_path(path)?)?;
    }
    if let Some(retries) = args.max_retries {
        pipeline = pipeline
            .with_audit_retries(retries)
            .with_merge_retries(retries);
    }
    Ok(pipeline)
}

fn create_classifier(args: &ClassifierArgs) -> Result<Box<dyn Classifier>, Box<dyn std::error::Error>> {
    if args.offline {
        return Ok(Box::new(OfflineClassifier));
    }
    let classifier = OpenAiClassifier::new(ApiConfig::from_env()?)?;
    tracing::debug!(model = classifier.model(), "using chat completions classifier");
    Ok(Box::new(BackoffClassifier::new(classifier)))
}

fn read_lines(path: &Path) -> io::Result<Vec<String>> {
    let text = if path == Path::new("-") {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(path)?
    };
    Ok(split_text(&text))
}

fn to_json<T: serde::Serialize>(value: &T, compact: bool) -> serde_json::Result<String> {
    if compact {
        serde_json::to_string(value)
    } else {
        serde_json::to_string_pretty(value)
    }
}

fn report_outcome(outcome: &ExtractionOutcome, output: Option<&Path>) {
    match outcome {
        ExtractionOutcome::Failed(failure) => {
            eprintln!("{} Extraction failed: {}", "!".yellow().bold(), failure.error);
        }
        ExtractionOutcome::Extracted(document) => {
            if document.needs_human_review() {
                eprintln!("{} Needs human review", "!".yellow().bold());
            }
            if let Some(path) = output {
                println!(
                    "{} Split into {} clauses: {}",
                    "✓".green().bold(),
                    document.clauses.len(),
                    path.display()
                );
            }
        }
    }
}

fn print_version() {
    println!("{} {}", "clausecut".green().bold(), env!("CARGO_PKG_VERSION"));
    println!("Contract clause segmentation with LLM-verified boundaries");
    println!();
    println!("Markers: 第X条, Article N");
    println!("Repository: https://github.com/iyulab/clausecut");
}

fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
            .template("{spinner:.blue} {msg}")
            .unwrap(),
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

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CONTRACT: &str = "業務委託契約書\n\
                            甲と乙は以下のとおり契約を締結する。\n\
                            第1条 目的\n\
                            本契約の目的を定める。\n\
                            第2条 期間\n\
                            本契約の期間は1年とする。\n\
                            2024年4月1日\n\
                            （甲）株式会社A 代表取締役 山田太郎\n\
                            別紙1 価格表\n";

    fn write_input(dir: &TempDir, text: &str) -> PathBuf {
        let path = dir.path().join("contract.txt");
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_cli_parse() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_read_lines() {
        let dir = TempDir::new().unwrap();
        let path = write_input(&dir, "第1条 目的\r\n本文\n");
        let lines = read_lines(&path).unwrap();
        assert_eq!(lines, vec!["第1条 目的", "本文"]);
    }

    #[test]
    fn test_split_offline_to_file() {
        let dir = TempDir::new().unwrap();
        let input = write_input(&dir, CONTRACT);
        let output = dir.path().join("out.json");

        let cli = Cli::parse_from([
            "clausecut",
            "split",
            input.to_str().unwrap(),
            "--offline",
            "-q",
            "-o",
            output.to_str().unwrap(),
        ]);
        run(cli).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(value["title"], "業務委託契約書");
        assert_eq!(value["clauses"].as_array().unwrap().len(), 2);
        assert_eq!(value["attachments"], serde_json::json!(["別紙1 価格表"]));
        assert!(value["signature_section"]
            .as_str()
            .unwrap()
            .starts_with("2024年4月1日"));
    }

    #[test]
    fn test_split_without_tail_audit() {
        let dir = TempDir::new().unwrap();
        let input = write_input(&dir, CONTRACT);
        let output = dir.path().join("out.json");

        let cli = Cli::parse_from([
            "clausecut",
            "split",
            input.to_str().unwrap(),
            "--offline",
            "--no-tail-audit",
            "--compact",
            "-q",
            "-o",
            output.to_str().unwrap(),
        ]);
        run(cli).unwrap();

        let json = fs::read_to_string(&output).unwrap();
        assert!(!json.contains('\n'));
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["signature_section"], "");
        assert!(value["clauses"][1]["text"]
            .as_str()
            .unwrap()
            .ends_with("別紙1 価格表"));
    }

    #[test]
    fn test_deterministic_split_builds_no_remote_classifier() {
        let dir = TempDir::new().unwrap();
        let input = write_input(&dir, CONTRACT);
        let output = dir.path().join("out.json");

        let cli = Cli::parse_from([
            "clausecut",
            "split",
            input.to_str().unwrap(),
            "--no-tail-audit",
            "--no-merge",
            "-q",
            "-o",
            output.to_str().unwrap(),
        ]);
        match &cli.command {
            Commands::Split { classifier, .. } => assert!(!classifier.offline),
            _ => panic!("expected split command"),
        }
        run(cli).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(value["title"], "業務委託契約書");
        assert_eq!(value["clauses"].as_array().unwrap().len(), 2);
        assert_eq!(value["signature_section"], "");
    }

    #[test]
    fn test_rules_round_trip_through_file() {
        let dir = TempDir::new().unwrap();
        let rules = dir.path().join("rules.json");
        run(Cli::parse_from(["clausecut", "rules", "-o", rules.to_str().unwrap()])).unwrap();

        let loaded = rules_from_path(&rules).unwrap();
        assert_eq!(loaded, default_tail_boundary_rules());
    }

    #[test]
    fn test_missing_input_is_an_error() {
        let cli = Cli::parse_from(["clausecut", "candidates", "/nonexistent/contract.txt"]);
        assert!(run(cli).is_err());
    }
}

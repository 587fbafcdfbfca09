use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use dacpac_patcher::{
    check_input_files, load_profile, process_package, AddBeforeFirst, FilterRules,
    FilterTransform, ProcessOptions, ProcessReport, MODEL_PART,
};
use log::LevelFilter;
use similar::{ChangeTag, TextDiff};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "dacpac-patcher")]
#[command(about = "Edit the model of a DACPAC package without reformatting it", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log output (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Insert content before the first element of the model
    #[command(alias = "Add")]
    Add {
        /// DACPAC file to modify
        #[arg(short, long)]
        file: PathBuf,

        /// File whose content is inserted verbatim
        #[arg(short, long)]
        add: PathBuf,

        #[command(flatten)]
        run: RunFlags,
    },

    /// Drop and rewrite model elements with regular expressions
    #[command(alias = "Filter")]
    Filter {
        /// DACPAC file to modify
        #[arg(short, long)]
        file: PathBuf,

        /// Blacklist file: one regex per line, matching elements are removed
        #[arg(short, long)]
        blacklist: Option<PathBuf>,

        /// Replace file: one `regex<TAB>replacement` per line
        #[arg(short, long)]
        replace: Option<PathBuf>,

        /// TOML filter profile, applied before the rule files
        #[arg(long)]
        profile: Option<PathBuf>,

        #[command(flatten)]
        run: RunFlags,
    },
}

#[derive(Args)]
struct RunFlags {
    /// Dry run - show what would be changed without modifying the package
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Show unified diff of the model
    #[arg(short, long)]
    diff: bool,
}

impl RunFlags {
    fn options(&self) -> ProcessOptions {
        ProcessOptions {
            dry_run: self.dry_run,
            capture_model: self.diff,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Add { file, add, run } => cmd_add(&file, &add, &run),

        Commands::Filter {
            file,
            blacklist,
            replace,
            profile,
            run,
        } => cmd_filter(
            &file,
            blacklist.as_deref(),
            replace.as_deref(),
            profile.as_deref(),
            &run,
        ),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

/// Exit with status 1 if any input is missing. Runs before the package is opened.
fn require_inputs(paths: &[&Path]) {
    if let Err(e) = check_input_files(paths.iter().copied()) {
        eprintln!("{}", format!("ERROR: {}", e).red());
        std::process::exit(1);
    }
}

fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {}/{} (original)", file.display(), MODEL_PART).dimmed()
    );
    println!(
        "{}",
        format!("+++ {}/{} (patched)", file.display(), MODEL_PART).dimmed()
    );

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => continue,
        };
        print!("{}", sign);
    }
}

fn print_report(file: &Path, report: &ProcessReport, show_diff: bool) {
    println!("  {} elements", report.stats.target_elements);
    println!("  checksum {}", report.checksum.dimmed());

    if show_diff {
        if report.model_changed() == Some(false) {
            println!("{}", "  Model unchanged".dimmed());
        } else if let (Some(before), Some(after)) =
            (&report.original_model, &report.rewritten_model)
        {
            display_diff(file, before, after);
        }
    }

    println!();
    if report.committed {
        println!("{} {}", "✓".green(), file.display());
    } else {
        println!(
            "{}",
            "  [DRY RUN - package was not modified]".cyan()
        );
    }
}

fn cmd_add(file: &Path, add: &Path, run: &RunFlags) -> Result<()> {
    require_inputs(&[file, add]);

    let mut transform = AddBeforeFirst::from_file(add)
        .with_context(|| format!("failed to read {}", add.display()))?;

    println!("Package: {}", file.display());
    let report = process_package(file, &mut transform, &run.options())
        .with_context(|| format!("failed to update {}", file.display()))?;

    if transform.inserted() {
        println!(
            "  {} content of {} before the first element",
            "inserted".green(),
            add.display()
        );
    } else {
        println!(
            "{}",
            "  No elements in the model, nothing inserted".yellow()
        );
    }
    print_report(file, &report, run.diff);

    Ok(())
}

fn cmd_filter(
    file: &Path,
    blacklist: Option<&Path>,
    replace: Option<&Path>,
    profile: Option<&Path>,
    run: &RunFlags,
) -> Result<()> {
    let mut inputs = vec![file];
    inputs.extend(blacklist);
    inputs.extend(replace);
    inputs.extend(profile);
    require_inputs(&inputs);

    let mut rules = FilterRules::new();
    if let Some(profile) = profile {
        println!("Loading profile from {}...", profile.display());
        let loaded = load_profile(profile)?;
        if let Some(description) = &loaded.description {
            println!("  {}", description.dimmed());
        }
        rules.extend(FilterRules::from_profile(
            &loaded,
            &profile.display().to_string(),
        )?);
    }
    rules.extend(FilterRules::load(blacklist, replace)?);
    log::info!(
        "{} replace rule(s), {} blacklist pattern(s)",
        rules.replacements().len(),
        rules.blacklist().len()
    );

    if rules.is_empty() {
        println!(
            "{}",
            "  No rules given, model is copied unchanged".yellow()
        );
    }

    let mut transform = FilterTransform::new(rules);

    println!("Package: {}", file.display());
    let report = process_package(file, &mut transform, &run.options())
        .with_context(|| format!("failed to filter {}", file.display()))?;

    let stats = transform.stats();
    println!("  {} kept", format!("{}", stats.kept).green());
    println!("  {} dropped", format!("{}", stats.dropped).red());
    println!("  {} rewritten", format!("{}", stats.rewritten).cyan());
    print_report(file, &report, run.diff);

    Ok(())
}

//! rankstore - User and leaderboard data in Redis
//!
//! Entry point for the CLI application.

use anyhow::Context;
use clap::Parser;
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing::error;
use tracing_subscriber::EnvFilter;

use rankstore::config::{CliArgs, Command, OutputFormat};
use rankstore::ingest::{Dataset, LoadProgress, LoadReport};
use rankstore::query::{
    Coordinates, EvenIdUsers, RankedEmail, UserProfile, DEFAULT_LEADERBOARD,
};
use rankstore::store::{FieldMap, RedisStore};
use rankstore::Session;

/// Users looked up by the demo's first two queries
const DEMO_ATTRIBUTES_USER: &str = "299";
const DEMO_COORDINATES_USER: &str = "2836";

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();
    setup_logging(args.verbose, args.quiet);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("{} {:#}", style("Error:").red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn setup_logging(verbose: bool, quiet: bool) {
    let directive = if verbose {
        "rankstore=debug"
    } else if quiet {
        "rankstore=warn"
    } else {
        "rankstore=info"
    };

    let filter = EnvFilter::from_default_env().add_directive(
        directive
            .parse()
            .unwrap_or_else(|_| tracing_subscriber::filter::LevelFilter::INFO.into()),
    );

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: CliArgs) -> anyhow::Result<()> {
    if let Command::Flush { yes: false } = args.command {
        if !confirm("This will erase every key in the database.")? {
            println!("Aborted.");
            return Ok(());
        }
    }

    let session = Session::open(&args)
        .await
        .context("Could not open a store session")?;

    let format = args.format;
    let quiet = args.quiet || format == OutputFormat::Json;
    match &args.command {
        Command::LoadUsers { file } => {
            let report = run_load(&session, Dataset::Users, file, quiet).await?;
            render(format, &report, || print_report(&report));
        }

        Command::LoadScores { file } => {
            let report = run_load(&session, Dataset::Scores, file, quiet).await?;
            render(format, &report, || print_report(&report));
        }

        Command::Attributes { user_id } => {
            let fields = session.user_attributes(user_id).await?;
            render(format, &fields, || print_attributes(user_id, fields.as_ref()));
        }

        Command::Coordinates { user_id } => {
            let coordinates = session.user_coordinates(user_id).await?;
            render(format, &coordinates, || {
                print_coordinates(user_id, coordinates.as_ref())
            });
        }

        Command::EvenIds { cursor } => {
            let users = session.even_prefixed_users_from(*cursor).await?;
            render(format, &users, || print_even_ids(&users));
        }

        Command::Regional => {
            let users = session.regional_female_users().await?;
            render(format, &users, || print_regional(&users));
        }

        Command::TopEmails { leaderboard, limit } => {
            let emails = session.top_emails(leaderboard, *limit).await?;
            render(format, &emails, || print_top_emails(leaderboard, &emails));
        }

        Command::Delete { keys } => {
            let removed = session.delete_keys(keys).await?;
            let outcome: BTreeMap<&str, bool> =
                keys.iter().map(String::as_str).zip(removed).collect();
            render(format, &outcome, || {
                for (key, existed) in &outcome {
                    if *existed {
                        println!("  {} {}", style("deleted").green(), key);
                    } else {
                        println!("  {} {}", style("missing").dim(), key);
                    }
                }
            });
        }

        Command::Flush { .. } => {
            session.delete_all().await?;
            if format == OutputFormat::Text {
                println!("{} Database erased.", style("Success:").green().bold());
            }
        }

        Command::Demo { users, scores } => run_demo(&session, users, scores, &args).await?,
    }

    Ok(())
}

/// Ask a yes/no question on the terminal; anything but `y` declines
fn confirm(warning: &str) -> anyhow::Result<bool> {
    print!(
        "{} {} Continue? [y/N] ",
        style("Warning:").yellow().bold(),
        warning
    );
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

fn render<T: Serialize + ?Sized>(format: OutputFormat, value: &T, text: impl FnOnce()) {
    match format {
        OutputFormat::Text => text(),
        OutputFormat::Json => match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to render JSON: {}", e),
        },
    }
}

fn spinner(quiet: bool) -> Option<ProgressBar> {
    if quiet {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

async fn run_load(
    session: &Session<RedisStore>,
    dataset: Dataset,
    path: &Path,
    quiet: bool,
) -> anyhow::Result<LoadReport> {
    if !quiet {
        let size = std::fs::metadata(path)
            .map(|m| format_size(m.len(), BINARY))
            .unwrap_or_else(|_| "unknown size".to_string());
        println!(
            "{} Loading {} ({})",
            style(format!("[{}]", dataset)).cyan().bold(),
            style(path.display()).green(),
            style(size).dim()
        );
    }

    let pb = spinner(quiet);
    let pb_clone = pb.clone();
    let on_progress = move |progress: LoadProgress| {
        if let Some(ref pb) = pb_clone {
            pb.set_message(format!(
                "Staged: {} | Committed: {} | Batches: {} | Skipped: {}",
                style(progress.staged).cyan(),
                style(progress.committed).green(),
                style(progress.batches).yellow(),
                if progress.skipped > 0 {
                    style(progress.skipped).red().to_string()
                } else {
                    style(progress.skipped).dim().to_string()
                }
            ));
        }
    };

    let started = Instant::now();
    let result = match dataset {
        Dataset::Users => session.load_users_with_progress(path, on_progress).await,
        Dataset::Scores => session.load_scores_with_progress(path, on_progress).await,
    };

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    let report = result.with_context(|| format!("Failed to load {}", path.display()))?;
    tracing::info!(
        "Loaded {} {} in {:.1}s",
        report.committed,
        dataset,
        started.elapsed().as_secs_f64()
    );
    Ok(report)
}

fn print_report(report: &LoadReport) {
    println!(
        "{}",
        style(format!("Loaded {}", report.dataset)).green().bold()
    );
    println!("  Records staged: {}", style(report.staged).cyan());
    println!("  Records committed: {}", style(report.committed).green());
    println!("  Batches: {}", style(report.batches).yellow());
    if report.skipped > 0 {
        println!("  Lines skipped: {}", style(report.skipped).red());
    }
}

fn print_attributes(user_id: &str, fields: Option<&FieldMap>) {
    println!("{}", style(format!("Attributes of user {}", user_id)).yellow().bold());
    match fields {
        Some(fields) => {
            let sorted: BTreeMap<_, _> = fields.iter().collect();
            for (field, value) in sorted {
                println!("  {}: {}", style(field).cyan(), value);
            }
        }
        None => println!("  {}", style("No such user").dim()),
    }
}

fn print_coordinates(user_id: &str, coordinates: Option<&Coordinates>) {
    println!("{}", style(format!("Coordinates of user {}", user_id)).yellow().bold());
    match coordinates {
        Some(c) => {
            println!("  Longitude: {}", style(&c.longitude).cyan());
            println!("  Latitude:  {}", style(&c.latitude).cyan());
        }
        None => println!("  {}", style("Not found").dim()),
    }
}

fn print_even_ids(users: &EvenIdUsers) {
    println!("{}", style("Users with an even leading digit").yellow().bold());
    if users.keys.is_empty() {
        println!("  {}", style("None found").dim());
        return;
    }
    println!("  Keys ({}): {}", style(users.keys.len()).cyan(), users.keys.join(", "));
    println!(
        "  Last names ({}): {}",
        style(users.last_names.len()).cyan(),
        users.last_names.join(", ")
    );
}

fn print_regional(users: &[UserProfile]) {
    println!(
        "{}",
        style("Women in China or Russia, latitude 40 to 46").yellow().bold()
    );
    if users.is_empty() {
        println!("  {}", style("None found").dim());
        return;
    }
    for user in users {
        println!(
            "  {} {} {} ({}, {} / {}) {}",
            style(&user.id).cyan(),
            user.first_name,
            user.last_name,
            user.country,
            user.latitude,
            user.longitude,
            style(&user.email).dim()
        );
    }
    println!("  Total: {}", style(users.len()).green());
}

fn print_top_emails(leaderboard: &str, emails: &[RankedEmail]) {
    println!(
        "{}",
        style(format!("Top players of leaderboard {}", leaderboard)).yellow().bold()
    );
    if emails.is_empty() {
        println!("  {}", style("No ranked players with an email").dim());
        return;
    }
    for (rank, entry) in emails.iter().enumerate() {
        println!(
            "  {:>2}. {} {}",
            rank + 1,
            style(&entry.email).green(),
            style(format!("({} pts, user {})", entry.score, entry.user_id)).dim()
        );
    }
}

#[derive(Serialize)]
struct DemoOutput {
    users: LoadReport,
    scores: LoadReport,
    attributes: Option<FieldMap>,
    coordinates: Option<Coordinates>,
    even_ids: EvenIdUsers,
    regional: Vec<UserProfile>,
    top_emails: Vec<RankedEmail>,
}

async fn run_demo(
    session: &Session<RedisStore>,
    users: &Path,
    scores: &Path,
    args: &CliArgs,
) -> anyhow::Result<()> {
    let text = args.format == OutputFormat::Text;
    let quiet = args.quiet || !text;

    session.delete_all().await?;

    let users_report = run_load(session, Dataset::Users, users, quiet).await?;
    if text {
        print_report(&users_report);
        println!();
    }
    let scores_report = run_load(session, Dataset::Scores, scores, quiet).await?;
    if text {
        print_report(&scores_report);
        println!();
    }

    let output = DemoOutput {
        users: users_report,
        scores: scores_report,
        attributes: session.user_attributes(DEMO_ATTRIBUTES_USER).await?,
        coordinates: session.user_coordinates(DEMO_COORDINATES_USER).await?,
        even_ids: session.even_prefixed_users().await?,
        regional: session.regional_female_users().await?,
        top_emails: session.top_player_emails().await?,
    };

    render(args.format, &output, || {
        print_attributes(DEMO_ATTRIBUTES_USER, output.attributes.as_ref());
        println!();
        print_coordinates(DEMO_COORDINATES_USER, output.coordinates.as_ref());
        println!();
        print_even_ids(&output.even_ids);
        println!();
        print_regional(&output.regional);
        println!();
        print_top_emails(DEFAULT_LEADERBOARD, &output.top_emails);
    });

    Ok(())
}

use std::io::{IsTerminal, Write};
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod chart;
mod db;
mod error;
mod loader;
mod models;
mod prompt;
mod report;
mod stats;

use chart::{TerminalRenderer, TextRenderer};
use models::{Roster, SubjectPlan};

#[derive(Parser)]
#[command(name = "cohort-grade-stats")]
#[command(about = "Descriptive grade statistics and charts for a class roster", long_about = None)]
struct Cli {
    /// Read the roster from a .json or .csv file
    #[arg(long, global = true)]
    roster: Option<PathBuf>,
    /// Read the roster from the Postgres gradebook at DATABASE_URL
    #[arg(long, global = true)]
    db: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask whether to show charts or text, then print the analysis
    Interactive {
        #[command(flatten)]
        plan: PlanArgs,
        #[command(flatten)]
        chart: ChartArgs,
    },
    /// Print per-student statistics and class averages
    Summary {
        #[command(flatten)]
        plan: PlanArgs,
    },
    /// Chart one subject for every student
    Chart {
        #[command(flatten)]
        chart: ChartArgs,
        /// Print charts as text instead of paging through them
        #[arg(long)]
        no_pause: bool,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        plan: PlanArgs,
        #[arg(long, default_value = "grade-report.md")]
        out: PathBuf,
    },
    /// Create or upgrade the gradebook schema
    InitDb,
    /// Load the sample roster into the gradebook
    Seed,
    /// Import grades from a CSV file into the gradebook
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
}

#[derive(Args)]
struct PlanArgs {
    #[arg(long, default_value = "math")]
    highest_subject: String,
    #[arg(long, default_value = "science")]
    lowest_subject: String,
    #[arg(long, default_value = "history")]
    sorted_subject: String,
    #[arg(long, default_value = "science")]
    std_dev_subject: String,
    #[arg(long, default_value = "math")]
    variance_subject: String,
}

impl Default for PlanArgs {
    fn default() -> Self {
        let plan = SubjectPlan::default();
        Self {
            highest_subject: plan.highest,
            lowest_subject: plan.lowest,
            sorted_subject: plan.sorted,
            std_dev_subject: plan.std_dev,
            variance_subject: plan.variance,
        }
    }
}

impl From<PlanArgs> for SubjectPlan {
    fn from(args: PlanArgs) -> Self {
        Self {
            highest: args.highest_subject,
            lowest: args.lowest_subject,
            sorted: args.sorted_subject,
            std_dev: args.std_dev_subject,
            variance: args.variance_subject,
        }
    }
}

#[derive(Args)]
struct ChartArgs {
    #[arg(long, default_value = "math")]
    subject: String,
    /// histogram, boxplot or lineplot
    #[arg(long, default_value = "histogram")]
    kind: String,
}

impl Default for ChartArgs {
    fn default() -> Self {
        Self {
            subject: "math".to_string(),
            kind: "histogram".to_string(),
        }
    }
}

enum RosterSource {
    Sample,
    File(PathBuf),
    Postgres,
}

impl RosterSource {
    fn from_cli(cli: &Cli) -> anyhow::Result<Self> {
        match (&cli.roster, cli.db) {
            (Some(_), true) => bail!("--roster and --db cannot be used together"),
            (Some(path), false) => Ok(Self::File(path.clone())),
            (None, true) => Ok(Self::Postgres),
            (None, false) => Ok(Self::Sample),
        }
    }

    fn label(&self) -> String {
        match self {
            Self::Sample => "the built-in sample roster".to_string(),
            Self::File(path) => path.display().to_string(),
            Self::Postgres => "the Postgres gradebook".to_string(),
        }
    }

    async fn load(&self) -> anyhow::Result<Roster> {
        let roster = match self {
            Self::Sample => models::sample_roster(),
            Self::File(path) => loader::load_roster(path)?,
            Self::Postgres => db::fetch_roster(&connect().await?).await?,
        };
        info!(source = %self.label(), students = roster.len(), "roster ready");
        Ok(roster)
    }
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to use the Postgres gradebook")?;

    PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn is_interactive() -> bool {
    std::io::stdin().is_terminal() && std::io::stdout().is_terminal()
}

fn show_charts(roster: &Roster, chart: &ChartArgs, interactive: bool) -> anyhow::Result<()> {
    let mut out = std::io::stdout();
    if interactive {
        // the alternate screen owns stdout until restore, so notes are held back
        let mut notes = Vec::new();
        let mut terminal = ratatui::init();
        let result = report::write_visual_report(
            &mut notes,
            roster,
            &chart.subject,
            &chart.kind,
            &mut TerminalRenderer::new(&mut terminal),
        );
        ratatui::restore();
        out.write_all(&notes)?;
        result?;
    } else {
        let mut renderer = TextRenderer::new(std::io::stdout());
        report::write_visual_report(&mut out, roster, &chart.subject, &chart.kind, &mut renderer)?;
    }
    out.flush()?;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();
    let source = RosterSource::from_cli(&cli)?;

    let command = cli.command.unwrap_or(Commands::Interactive {
        plan: PlanArgs::default(),
        chart: ChartArgs::default(),
    });

    match command {
        Commands::Interactive { plan, chart } => {
            let roster = source.load().await?;
            let graphical = {
                let mut input = std::io::stdin().lock();
                let mut out = std::io::stdout();
                prompt::ask_yes_no(&mut input, &mut out, prompt::MODE_QUESTION)?
            };

            if graphical {
                show_charts(&roster, &chart, is_interactive())?;
            } else {
                print!("{}", report::build_summary(&roster, &plan.into()));
            }
        }
        Commands::Summary { plan } => {
            let roster = source.load().await?;
            print!("{}", report::build_summary(&roster, &plan.into()));
        }
        Commands::Chart { chart, no_pause } => {
            let roster = source.load().await?;
            show_charts(&roster, &chart, !no_pause && is_interactive())?;
        }
        Commands::Report { plan, out } => {
            let roster = source.load().await?;
            let report = report::build_report(
                &source.label(),
                chrono::Local::now().date_naive(),
                &roster,
                &plan.into(),
            );
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::InitDb => {
            db::init_db(&connect().await?).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let inserted = db::seed(&connect().await?).await?;
            println!("Seed data inserted ({inserted} new grades).");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&connect().await?, &csv).await?;
            println!("Inserted {inserted} grades from {}.", csv.display());
        }
    }

    Ok(())
}

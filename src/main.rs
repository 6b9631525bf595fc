use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

mod analysis;
mod cohort;
mod config;
mod error;
mod gpa;
mod loader;
mod models;
mod report;

use crate::analysis::RankOrder;
use crate::cohort::Cohorts;
use crate::config::AnalysisConfig;
use crate::gpa::TermScope;
use crate::models::InstructorGrades;

#[derive(Parser)]
#[command(name = "student-records")]
#[command(about = "Descriptive statistics over university student records", long_about = None)]
struct Cli {
    /// Directory holding the seven CSV tables
    #[arg(long, global = true, env = "DATA_DIR")]
    data_dir: Option<PathBuf>,
    /// JSON file with analysis settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Halt when a student appears in more than one terminal set
    #[arg(long, global = true)]
    strict_integrity: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Count records per table and students per status
    Counts,
    /// Check that alumni, unretained and expelled do not overlap
    Validate,
    /// Distribution of current students by major
    Majors,
    /// Course enrollments by department for one term
    Departments {
        #[arg(long)]
        term: Option<String>,
    },
    /// Graduation rates by major
    GradRates,
    /// Number of terms alumni needed to graduate
    Terms,
    /// GPA of current students
    Gpa {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Instructors ranked by share of A grades
    Instructors {
        #[arg(long)]
        min_grades: Option<usize>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// First-term GPA and graduation rates by GPA range
    FirstTerm {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Run every report and write a markdown summary
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
        /// Also write the full results as JSON
        #[arg(long)]
        json: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AnalysisConfig::load(path)?,
        None => AnalysisConfig::default(),
    };
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    config.strict_integrity |= cli.strict_integrity;
    config.validate().context("invalid analysis settings")?;

    let dataset = loader::load_dataset(&config.data_dir)?;

    match cli.command {
        Commands::Counts => {
            for (table, records) in dataset.table_counts() {
                println!("The number of records in {table} is {records}");
            }
            report::check_integrity(&dataset, &config)?;
            let counts = analysis::status_counts(&dataset, &Cohorts::classify(&dataset));
            println!();
            println!("Number of accepted students:   {}", counts.accepted);
            println!("Number of enrolled students:   {}", counts.enrolled);
            println!("Number of current students:    {}", counts.current);
            println!("Number of former students:     {}", counts.former);
            println!("Number of unretained students: {}", counts.unretained);
            println!("Number of expelled students:   {}", counts.expelled);
            println!("Number of alumni:              {}", counts.alumni);
        }
        Commands::Validate => {
            cohort::check_disjoint(&dataset.alumni, &dataset.unretained, &dataset.expelled)?;
            println!("Terminal status sets are disjoint.");
        }
        Commands::Majors => {
            report::check_integrity(&dataset, &config)?;
            let shares = analysis::major_distribution(&dataset, &Cohorts::classify(&dataset));
            if shares.is_empty() {
                println!("No current students.");
            }
            for share in shares {
                println!("- {}: {} students ({:.4})", share.major, share.n_students, share.prop);
            }
        }
        Commands::Departments { term } => {
            let term = term.unwrap_or_else(|| config.enrollment_term.clone());
            let shares = analysis::department_enrollment(&dataset, &term)?;
            println!("Course enrollments by department for {term}:");
            for share in shares {
                println!("- {}: {} enrollments ({:.4})", share.dept, share.n_students, share.prop);
            }
        }
        Commands::GradRates => {
            report::check_integrity(&dataset, &config)?;
            let rates = analysis::graduation_by_major(&dataset, &Cohorts::classify(&dataset));
            for rate in rates {
                println!(
                    "- {}: {} alumni / {} former = {}",
                    rate.major,
                    rate.n_alumni,
                    rate.n_former,
                    report::format_rate(rate.grad_rate)
                );
            }
        }
        Commands::Terms => {
            for entry in analysis::terms_to_graduation(&dataset) {
                println!("- {} terms: {} alumni", entry.n_terms, entry.n_alumni);
            }
        }
        Commands::Gpa { limit } => {
            report::check_integrity(&dataset, &config)?;
            let cohorts = Cohorts::classify(&dataset);
            let all_terms = gpa::gpa_by_student(&dataset, TermScope::All)?;
            let gpa_report = analysis::current_gpa_report(
                &dataset,
                &cohorts,
                &all_terms,
                &config.histogram_edges,
            )?;

            println!("Lowest GPAs among current students:");
            for student in gpa_report.students.iter().take(limit.unwrap_or(config.preview_rows)) {
                println!(
                    "- {} {} ({}, {}): {}",
                    student.first_name,
                    student.last_name,
                    student.sid,
                    student.major,
                    report::format_gpa(student.gpa)
                );
            }
            println!();
            println!("Current students with a perfect 4.0: {}", gpa_report.perfect_count);
            println!();
            println!("GPA distribution for current students:");
            print!("{}", report::render_histogram(&gpa_report.distribution));
        }
        Commands::Instructors { min_grades, limit } => {
            let distribution = analysis::instructor_grade_distribution(&dataset)?;
            let min_grades = min_grades.unwrap_or(config.min_instructor_grades);
            let limit = limit.unwrap_or(config.ranking_limit);

            println!("Instructors awarding the fewest A grades (N >= {min_grades}):");
            let fewest = analysis::rank_instructors(&distribution, min_grades, RankOrder::FewestA, limit);
            print_instructors(&fewest);

            println!();
            println!("Instructors awarding the most A grades (N >= {min_grades}):");
            let most = analysis::rank_instructors(&distribution, min_grades, RankOrder::MostA, limit);
            print_instructors(&most);
        }
        Commands::FirstTerm { limit } => {
            report::check_integrity(&dataset, &config)?;
            let cohorts = Cohorts::classify(&dataset);
            let first_term = gpa::gpa_by_student(&dataset, TermScope::FirstTerm)?;

            println!("First-term GPA:");
            for row in gpa::first_term_rows(&first_term)
                .iter()
                .take(limit.unwrap_or(config.preview_rows))
            {
                println!("- {}: {}", row.sid, report::format_gpa(row.first_term_gpa));
            }

            println!();
            println!("Graduation rates by first-term GPA:");
            for rate in analysis::graduation_by_first_term_bin(&dataset, &cohorts, &first_term)? {
                println!(
                    "- {}: {} alumni / {} former = {}",
                    rate.gpa_bin,
                    rate.n_alumni,
                    rate.n_former,
                    report::format_rate(rate.grad_rate)
                );
            }
        }
        Commands::Report { out, json } => {
            let bundle = report::build_bundle(&dataset, &config)?;
            let failed = bundle.failed_sections();
            if !failed.is_empty() {
                warn!(?failed, "Some reports could not be produced");
            }

            std::fs::write(&out, report::build_report(&bundle, config.preview_rows))
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());

            if let Some(path) = json {
                let content = serde_json::to_string_pretty(&bundle)?;
                std::fs::write(&path, content)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                println!("Results written to {}.", path.display());
            }
        }
    }

    Ok(())
}

fn print_instructors(instructors: &[InstructorGrades]) {
    if instructors.is_empty() {
        println!("No instructors meet the minimum grade count.");
    }
    for i in instructors {
        println!(
            "- {} {} ({}, {}) N={} propA={:.2} propB={:.2} propC={:.2} propD={:.2} propF={:.2}",
            i.first_name, i.last_name, i.fid, i.dept, i.n, i.prop_a, i.prop_b, i.prop_c, i.prop_d, i.prop_f
        );
    }
}

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::error;

use syllo_grades::aggregate;
use syllo_grades::config::AppConfig;
use syllo_grades::db::{self, CreateUserOutcome, PgStore};
use syllo_grades::import;
use syllo_grades::models::{
    AssignmentRecord, CourseKey, CoursePredictionRequest, CourseProfile, GradePlatform,
    GradeStyle,
};
use syllo_grades::predict;
use syllo_grades::profile::StudentProfile;
use syllo_grades::report;
use syllo_grades::service::{PredictionService, ServiceError};
use syllo_grades::store::CourseProfileStore;
use syllo_grades::telemetry;

#[derive(Parser)]
#[command(name = "syllo")]
#[command(about = "Syllabus-driven grade tracking and prediction", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Predict from local files without touching the database
    Preview {
        #[arg(long)]
        syllabus: PathBuf,
        #[arg(long)]
        assignments: PathBuf,
        #[arg(long, default_value = "raw")]
        style: GradeStyle,
    },
    #[command(flatten)]
    Database(DbCommands),
}

/// Commands that need a database connection.
#[derive(Subcommand)]
enum DbCommands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a demo student, course, and assignments
    Seed,
    /// Register a signed-in user
    CreateUser {
        #[arg(long)]
        user: String,
        #[arg(long)]
        email: String,
    },
    /// Save onboarding answers from a JSON file
    Onboard {
        #[arg(long)]
        user: String,
        #[arg(long)]
        profile: PathBuf,
    },
    /// Store a parsed syllabus (JSON) for a course
    UploadCourse {
        #[arg(long)]
        user: String,
        #[arg(long)]
        course: String,
        #[arg(long)]
        syllabus: PathBuf,
    },
    /// Import assignments from a CSV export
    ImportAssignments {
        #[arg(long)]
        csv: PathBuf,
    },
    /// List a user's courses and their predicted grades
    Courses {
        #[arg(long)]
        user: String,
    },
    /// Predict a course grade and save it with the chosen preferences
    Predict {
        #[arg(long)]
        user: String,
        #[arg(long)]
        course: String,
        #[arg(long, default_value = "raw")]
        style: GradeStyle,
        #[arg(long, default_value = "both")]
        platform: GradePlatform,
    },
    /// Generate a markdown report for a stored course
    Report {
        #[arg(long)]
        user: String,
        #[arg(long)]
        course: String,
        /// Defaults to the style saved for the course
        #[arg(long)]
        style: Option<GradeStyle>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;
    telemetry::init(&config.log_level)?;

    match cli.command {
        Commands::Preview {
            syllabus,
            assignments,
            style,
        } => preview(&syllabus, &assignments, style),
        Commands::Database(command) => run(&config, command).await,
    }
}

async fn run(config: &AppConfig, command: DbCommands) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;

    match command {
        DbCommands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        DbCommands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        DbCommands::CreateUser { user, email } => {
            match db::create_user(&pool, &user, &email).await? {
                CreateUserOutcome::Created => println!("User {user} created."),
                CreateUserOutcome::AlreadyExists => println!("User {user} already exists."),
            }
        }
        DbCommands::Onboard { user, profile } => {
            let profile: StudentProfile = read_json(&profile)?;
            db::save_student_profile(&pool, &user, &profile).await?;
            println!("Saved profile for {}.", profile.full_name());
        }
        DbCommands::UploadCourse {
            user,
            course,
            syllabus,
        } => {
            let profile: CourseProfile = read_json(&syllabus)?;
            let key = CourseKey::new(user, course);
            PgStore::new(pool).save_course(&key, &profile).await?;
            println!("Stored syllabus for {key}.");
        }
        DbCommands::ImportAssignments { csv } => {
            let rows = import::read_assignments(&csv)?;
            let written = db::import_assignments(&pool, &rows).await?;
            println!("Imported {written} assignments from {}.", csv.display());
        }
        DbCommands::Courses { user } => {
            let courses = db::fetch_user_courses(&pool, &user).await?;
            if courses.is_empty() {
                println!("No courses uploaded yet.");
                return Ok(());
            }
            for course in courses {
                let grade = course
                    .predicted_grade
                    .map(|grade| format!("{grade:.1}%"))
                    .unwrap_or_else(|| "no prediction".to_string());
                println!(
                    "- {} ({}): {} [{}]",
                    course.course,
                    course.course_name,
                    grade,
                    course.grade_style.as_str()
                );
            }
        }
        DbCommands::Predict {
            user,
            course,
            style,
            platform,
        } => {
            let store = PgStore::new(pool);
            let service = PredictionService::new(store.clone(), store);
            let key = CourseKey::new(user, course);

            match service.predict_course(&key, style, platform).await {
                Ok(result) => match result.predicted_grade {
                    Some(grade) => println!("Predicted grade for {key}: {grade:.1}%"),
                    None => println!("Not enough graded work to predict {key} yet."),
                },
                Err(err @ ServiceError::Persistence { .. }) => {
                    error!(course = %key, error = %err, "prediction not saved");
                    anyhow::bail!("failed to save your grade settings, please try again");
                }
                Err(err) => return Err(err.into()),
            }
        }
        DbCommands::Report {
            user,
            course,
            style,
            out,
        } => {
            let store = PgStore::new(pool);
            let key = CourseKey::new(user, course);
            let profile = store
                .fetch_course(&key)
                .await?
                .with_context(|| format!("no syllabus uploaded for {key}"))?;
            let assignments = aggregate::aggregate(&store, &key).await?;
            let style = style.unwrap_or(profile.grade_style);
            let output = render(&profile, assignments, style);
            std::fs::write(&out, output)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

fn preview(syllabus: &Path, assignments: &Path, style: GradeStyle) -> anyhow::Result<()> {
    let profile: CourseProfile = read_json(syllabus)?;
    let records: Vec<AssignmentRecord> = import::read_assignments(assignments)?
        .into_iter()
        .map(|row| row.record)
        .collect();
    print!("{}", render(&profile, records, style));
    Ok(())
}

fn render(
    profile: &CourseProfile,
    assignments: Vec<AssignmentRecord>,
    style: GradeStyle,
) -> String {
    let request = CoursePredictionRequest {
        breakdown: profile.grade_breakdown.clone(),
        assignments,
        style,
    };
    let analysis = request
        .breakdown
        .as_ref()
        .map(|breakdown| predict::analyze(breakdown, &request.assignments))
        .unwrap_or_default();
    let result = predict::predict(&request);
    report::build_report(profile, &request.assignments, &analysis, &result)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn preview_stays_off_the_database_path() {
        let cli = Cli::try_parse_from([
            "syllo",
            "preview",
            "--syllabus",
            "syllabus.json",
            "--assignments",
            "assignments.csv",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Preview {
                style: GradeStyle::Raw,
                ..
            }
        ));
    }

    #[test]
    fn database_commands_parse_at_the_top_level() {
        let cli = Cli::try_parse_from([
            "syllo", "predict", "--user", "user-1", "--course", "CS_61A", "--style", "curved",
        ])
        .unwrap();
        match cli.command {
            Commands::Database(DbCommands::Predict { course, style, .. }) => {
                assert_eq!(course, "CS_61A");
                assert_eq!(style, GradeStyle::Curved);
            }
            _ => panic!("predict should be a database command"),
        }
    }
}

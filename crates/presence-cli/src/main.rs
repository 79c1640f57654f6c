use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use presence_core::{report, Gender, Incident, Operator, Role};
use presence_store::CollectionStore;
use presenced::admin::{AdminSurface, StudentDraft};
use presenced::export::incidents_to_csv;
use presenced::recorder::IncidentRecorder;
use presenced::wire;
use presenced::{AppContext, Config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "presence", about = "Presence attendance administration CLI")]
struct Cli {
    /// Act as the operator with this email (must exist in the user
    /// directory to carry a role other than teacher)
    #[arg(long = "as", global = true, value_name = "EMAIL")]
    acting_as: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the student roster
    Students {
        #[command(subcommand)]
        command: StudentCommands,
    },
    /// Manage operator accounts and roles
    Users {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Record a disciplinary incident against an enrolled student
    Record {
        #[command(subcommand)]
        command: RecordCommands,
    },
    /// Export the incident log as CSV
    Export {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Print incident summaries
    Report {
        /// How many students to list in the tardy ranking
        #[arg(long, default_value_t = 5)]
        top: usize,
    },
    /// Show store contents at a glance
    Status,
}

#[derive(Subcommand)]
enum StudentCommands {
    /// List enrolled students
    List,
    /// Add a student with a pre-captured face descriptor
    Add {
        name: String,
        /// Class label, e.g. "7A"
        class: String,
        /// Gender code: L or P
        gender: String,
        /// JSON file holding the 128-float face descriptor
        #[arg(long)]
        descriptor_file: PathBuf,
    },
    /// Remove a student record
    Remove {
        /// Student ID to remove
        id: String,
    },
}

#[derive(Subcommand)]
enum RecordCommands {
    /// Record a late arrival
    Late {
        /// Student ID
        id: String,
        /// Minutes late (positive whole number)
        minutes: String,
        /// Reason; omitted means "No reason provided"
        #[arg(long, default_value = "")]
        reason: String,
    },
    /// Record an approved period leave
    Leave {
        /// Student ID
        id: String,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// List operator accounts
    List,
    /// Change an operator's role
    SetRole {
        /// Account ID to change
        uid: String,
        /// New role: admin or teacher
        role: String,
    },
    /// Create the first admin account (only while the directory is empty)
    SeedAdmin {
        /// Account ID for the new admin
        uid: String,
        email: String,
    },
}

/// Record an incident for an enrolled student, identified by id instead
/// of by camera. Period leave is only offered for female students,
/// matching the scanner action panel.
async fn record_incident(
    store: std::sync::Arc<dyn CollectionStore>,
    collections: &presence_store::Collections,
    operator: &Operator,
    command: RecordCommands,
) -> Result<String> {
    let surface = AdminSurface::new(store.clone(), collections);
    let students = surface.list_students().await?;
    let student_id = match &command {
        RecordCommands::Late { id, .. } | RecordCommands::Leave { id } => id.clone(),
    };
    let Some(student) = students.iter().find(|s| s.id == student_id) else {
        bail!("no student with id {student_id}");
    };

    let recorder = IncidentRecorder::new(store, collections);
    match command {
        RecordCommands::Late {
            minutes, reason, ..
        } => {
            recorder.set_draft(&minutes, &reason);
            Ok(recorder.submit_late(Some(student), operator).await?)
        }
        RecordCommands::Leave { .. } => {
            if student.gender != Gender::Female {
                bail!("period leave can only be recorded for female students");
            }
            Ok(recorder.record_leave(Some(student), operator).await?)
        }
    }
}

/// Resolve the acting operator against the user directory. An email with
/// no directory entry acts with the default teacher role.
async fn resolve_operator(surface: &AdminSurface, email: Option<&str>) -> Result<Operator> {
    let users = surface.list_users().await?;
    let email = email.unwrap_or("Unknown");
    let role = users
        .iter()
        .find(|u| u.email == email)
        .map(|u| u.role)
        .unwrap_or_default();
    Ok(Operator {
        email: email.to_string(),
        role,
    })
}

async fn load_incidents(ctx: &AppContext) -> Result<Vec<Incident>> {
    let docs = ctx.store.list(&ctx.collections.logs()).await?;
    Ok(docs
        .iter()
        .filter_map(|doc| match wire::incident_from_doc(doc) {
            Ok(incident) => Some(incident),
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed incident record");
                None
            }
        })
        .collect())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let ctx = AppContext::init(Config::from_env()).await?;
    let surface = AdminSurface::new(ctx.store.clone(), &ctx.collections);
    let operator = resolve_operator(&surface, cli.acting_as.as_deref()).await?;

    match cli.command {
        Commands::Students { command } => match command {
            StudentCommands::List => {
                let students = surface.list_students().await?;
                if students.is_empty() {
                    println!("No students enrolled");
                }
                for student in students {
                    println!(
                        "{}  {}  {}  {}",
                        student.id,
                        student.name,
                        student.class,
                        student.gender.as_code()
                    );
                }
            }
            StudentCommands::Add {
                name,
                class,
                gender,
                descriptor_file,
            } => {
                let Some(gender) = Gender::from_code(&gender) else {
                    bail!("gender must be L or P");
                };
                let raw = std::fs::read_to_string(&descriptor_file)
                    .with_context(|| format!("reading {}", descriptor_file.display()))?;
                let Some(descriptor) = wire::decode_descriptor(&raw) else {
                    bail!("descriptor file must hold a JSON array of 128 floats");
                };
                let draft = StudentDraft {
                    id: String::new(),
                    name,
                    class,
                    gender,
                    descriptor: Some(descriptor),
                };
                let id = surface.save_student(&operator, &draft).await?;
                println!("Added student {id}");
            }
            StudentCommands::Remove { id } => {
                surface.delete_student(&operator, &id).await?;
                println!("Removed student {id}");
            }
        },
        Commands::Users { command } => match command {
            UserCommands::List => {
                let users = surface.list_users().await?;
                if users.is_empty() {
                    println!("No operator accounts");
                }
                for user in users {
                    println!("{}  {}  {}", user.id, user.email, user.role.as_str());
                }
            }
            UserCommands::SetRole { uid, role } => {
                let Some(role) = Role::from_str(&role) else {
                    bail!("role must be admin or teacher");
                };
                surface.set_role(&operator, &uid, role).await?;
                println!("Set {uid} to {}", role.as_str());
            }
            UserCommands::SeedAdmin { uid, email } => {
                surface.seed_admin(&uid, &email).await?;
                println!("Seeded admin {email}");
            }
        },
        Commands::Record { command } => {
            let incident =
                record_incident(ctx.store.clone(), &ctx.collections, &operator, command).await?;
            println!("Recorded incident {incident}");
        }
        Commands::Export { out } => {
            let incidents = load_incidents(ctx).await?;
            let csv = incidents_to_csv(&incidents)?;
            match out {
                Some(path) => {
                    std::fs::write(&path, csv)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("Exported {} incidents to {}", incidents.len(), path.display());
                }
                None => print!("{csv}"),
            }
        }
        Commands::Report { top } => {
            let incidents = load_incidents(ctx).await?;
            let share = report::kind_share(&incidents);
            println!("Incidents: {} late, {} period leave", share.late, share.period_leave);

            println!("\nTop tardy students:");
            for entry in report::top_tardy_students(&incidents, top) {
                println!("  {:>3}  {} ({})", entry.tardies, entry.name, entry.class);
            }

            println!("\nTardy reasons:");
            for (reason, count) in report::reason_distribution(&incidents) {
                println!("  {count:>3}  {reason}");
            }
        }
        Commands::Status => {
            let students = ctx.store.list(&ctx.collections.students()).await?;
            let logs = ctx.store.list(&ctx.collections.logs()).await?;
            let users = ctx.store.list(&ctx.collections.users()).await?;
            println!("app id:   {}", ctx.config.app_id);
            println!("students: {}", students.len());
            println!("incidents: {}", logs.len());
            println!("users:    {}", users.len());
        }
    }

    Ok(())
}

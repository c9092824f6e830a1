use chrono::{DateTime, Local, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use childcare_supabase::attendance::{AttendanceStatus, AttendanceTracker, TransitionOutcome};
use childcare_supabase::auth::{FileSessionStore, SessionManager, TokenSource};
use childcare_supabase::config::ClientConfig;
use childcare_supabase::error::{Error, Result};
use childcare_supabase::models::{Child, Identity, NewEvent};
use childcare_supabase::Childcare;

#[derive(Parser)]
#[clap(name = "childcare", version, about = "Attendance and events from the command line")]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and keep the session
    Login {
        #[clap(long)]
        email: String,
        #[clap(long, env = "CHILDCARE_PASSWORD")]
        password: String,
    },
    /// Sign out and forget the session
    Logout,
    /// Show the signed-in identity
    Whoami,
    /// List attendance for a date
    Attendance {
        #[clap(long)]
        date: Option<NaiveDate>,
    },
    /// Advance one child to the next attendance state
    Mark {
        #[clap(long)]
        child: String,
        #[clap(long)]
        date: Option<NaiveDate>,
    },
    /// Mark every child present
    MarkAll {
        #[clap(long)]
        date: Option<NaiveDate>,
    },
    /// Create an event and notify guardians
    Event {
        #[clap(long)]
        title: String,
        /// RFC 3339 instant, e.g. 2024-03-08T15:00:00Z
        #[clap(long)]
        at: DateTime<Utc>,
        #[clap(long)]
        description: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Err(e) = run(Cli::parse()).await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = ClientConfig::from_env()?;
    let childcare = Childcare::from_config(&config);
    let store = Arc::new(FileSessionStore::new(config.session_file.clone()));
    let session = Arc::new(childcare.session_manager(store));

    match cli.command {
        Command::Login { email, password } => {
            let identity = session.sign_in(&email, &password).await?;
            println!("Signed in as {} ({:?})", identity.name, identity.role);
        }
        Command::Logout => {
            session.sign_out().await?;
            println!("Signed out");
        }
        Command::Whoami => match session.verify_stored_token().await? {
            Some(identity) => println!("{} <{}> ({:?})", identity.name, identity.email, identity.role),
            None => println!("Not signed in"),
        },
        Command::Attendance { date } => {
            restore(&session).await?;
            let tracker = open_tracker(&childcare, &session, date).await?;
            print_day(&tracker);
        }
        Command::Mark { child, date } => {
            let actor = restore(&session).await?;
            let mut tracker = open_tracker(&childcare, &session, date).await?;
            match tracker.cycle(&child, &actor, &confirm_on_stdin).await? {
                TransitionOutcome::Changed { from, to } => println!("{:?} -> {:?}", from, to),
                TransitionOutcome::Declined => println!("Left unchanged"),
            }
            print_day(&tracker);
        }
        Command::MarkAll { date } => {
            let actor = restore(&session).await?;
            let mut tracker = open_tracker(&childcare, &session, date).await?;
            let outcome = tracker.mark_all_present(&actor).await?;
            println!("{} created, {} updated", outcome.created, outcome.updated);
            print_day(&tracker);
        }
        Command::Event {
            title,
            at,
            description,
        } => {
            let actor = restore(&session).await?;
            let tokens: Arc<dyn TokenSource> = session.clone();
            let report = childcare
                .event_service(tokens)
                .create_event(
                    &actor,
                    NewEvent {
                        title,
                        description,
                        event_date: at,
                    },
                    Utc::now(),
                )
                .await?;
            println!(
                "Event {} created; {} guardians notified, {} reminders scheduled, {} failed",
                report.event.id,
                report.notified,
                report.scheduled.len(),
                report.failed.len()
            );
        }
    }

    Ok(())
}

async fn restore(session: &SessionManager) -> Result<Identity> {
    session
        .verify_stored_token()
        .await?
        .ok_or(Error::NotAuthenticated)
}

async fn open_tracker(
    childcare: &Childcare,
    session: &Arc<SessionManager>,
    date: Option<NaiveDate>,
) -> Result<AttendanceTracker> {
    let tokens: Arc<dyn TokenSource> = session.clone();
    let store = Arc::new(childcare.attendance_store(tokens));
    let date = date.unwrap_or_else(|| Local::now().date_naive());

    let mut tracker = AttendanceTracker::new(store, date, childcare.options.undo_window);
    tracker.reload().await?;
    Ok(tracker)
}

fn print_day(tracker: &AttendanceTracker) {
    println!("Attendance for {}", tracker.date());
    for child in tracker.roster() {
        let mark = match tracker.status_of(&child.id) {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Unmarked => "-",
        };
        println!("  {:<36} {:<24} {}", child.id, child.name, mark);
    }
    let stats = tracker.stats();
    println!(
        "present {}  absent {}  unmarked {}",
        stats.present, stats.absent, stats.unmarked
    );
}

fn confirm_on_stdin(child: &Child) -> bool {
    print!("Remove today's mark for {}? [y/N] ", child.name);
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim(), "y" | "Y" | "yes")
}

use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use tracing::info;
use ulid::Ulid;

use cabinbook::config::Config;
use cabinbook::directory::{InMemoryDirectory, UserDirectory};
use cabinbook::registry::CabinRegistry;
use cabinbook::{
    BookingRequest, DateRange, Engine, EngineError, Requester, ReservationPatch, ReservationStatus,
};

#[derive(Parser)]
#[command(name = "cabinbook", about = "Book stays at the shared cabin", version)]
struct Cli {
    /// Which resource to book.
    #[arg(long, global = true, default_value = "cabin")]
    cabin: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List reservations in date order.
    List {
        #[arg(long)]
        owner: Option<String>,
    },
    /// Book a stay. Becomes primary, or backup if a primary is in the way.
    Book {
        #[arg(long = "as")]
        as_user: String,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        purpose: String,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        handover: Option<String>,
        /// Mark as tentative interest only.
        #[arg(long)]
        soft: bool,
    },
    Edit {
        id: Ulid,
        #[arg(long = "as")]
        as_user: String,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long)]
        purpose: Option<String>,
        #[arg(long, conflicts_with = "clear_notes")]
        notes: Option<String>,
        #[arg(long)]
        clear_notes: bool,
        #[arg(long, conflicts_with = "clear_handover")]
        handover: Option<String>,
        #[arg(long)]
        clear_handover: bool,
        #[arg(long)]
        status: Option<ReservationStatus>,
    },
    Delete {
        id: Ulid,
        #[arg(long = "as")]
        as_user: String,
    },
    /// Give a reservation to another member (admins only).
    Assign {
        id: Ulid,
        #[arg(long = "as")]
        as_user: String,
        #[arg(long)]
        to: String,
    },
    /// Show the note the previous occupant left for this reservation.
    Handover { id: Ulid },
    /// Who holds the cabin on a given day.
    Occupant { day: NaiveDate },
    /// Backups queued behind a primary.
    Backups { id: Ulid },
    /// Verify no two primaries overlap.
    Audit,
}

fn requester(users: &dyn UserDirectory, id: &str) -> Result<Requester, EngineError> {
    users
        .find_user(id)
        .map(|u| Requester::from(&u))
        .ok_or_else(|| EngineError::UserNotFound(id.to_string()))
}

fn optional_note(value: Option<String>, clear: bool) -> Option<Option<String>> {
    if clear { Some(None) } else { value.map(Some) }
}

async fn run(engine: &Engine, users: &dyn UserDirectory, command: Command) -> Result<Value, Box<dyn std::error::Error>> {
    let out = match command {
        Command::List { owner } => match owner {
            Some(owner) => serde_json::to_value(engine.reservations_of(&owner).await?)?,
            None => serde_json::to_value(engine.list_reservations().await?)?,
        },
        Command::Book { as_user, from, to, purpose, notes, handover, soft } => {
            let who = requester(users, &as_user)?;
            let mut request = BookingRequest::new(DateRange::parse(&from, &to)?, purpose);
            request.notes = notes;
            request.handover_note = handover;
            request.soft = soft;
            serde_json::to_value(engine.create_reservation(&who.id, request).await?)?
        }
        Command::Edit {
            id,
            as_user,
            from,
            to,
            purpose,
            notes,
            clear_notes,
            handover,
            clear_handover,
            status,
        } => {
            let who = requester(users, &as_user)?;
            let patch = ReservationPatch {
                range: None,
                from,
                to,
                purpose,
                notes: optional_note(notes, clear_notes),
                handover_note: optional_note(handover, clear_handover),
                status,
            };
            serde_json::to_value(engine.edit_reservation(id, &who, patch).await?)?
        }
        Command::Delete { id, as_user } => {
            let who = requester(users, &as_user)?;
            let deleted = engine.delete_reservation(id, &who).await?;
            json!({ "deleted": deleted.id })
        }
        Command::Assign { id, as_user, to } => {
            let who = requester(users, &as_user)?;
            serde_json::to_value(engine.assign_reservation(id, &who, &to).await?)?
        }
        Command::Handover { id } => serde_json::to_value(engine.handover_for(id).await?)?,
        Command::Occupant { day } => serde_json::to_value(engine.occupant_on(day).await?)?,
        Command::Backups { id } => serde_json::to_value(engine.backups_of(id).await?)?,
        Command::Audit => {
            engine.audit().await?;
            json!({ "ok": true })
        }
    };
    Ok(out)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let config = Config::from_env();
    std::fs::create_dir_all(&config.data_dir)?;

    let users = Arc::new(InMemoryDirectory::load(&config.users_file)?);
    let registry = CabinRegistry::new(&config, users.clone());
    let engine = registry.get_or_open(&cli.cabin)?;
    info!("data_dir: {}", config.data_dir.display());

    let out = run(&engine, users.as_ref(), cli.command).await?;
    println!("{}", serde_json::to_string_pretty(&out)?);

    let compacted = registry.compact_due().await?;
    if compacted > 0 {
        info!("compacted {compacted} log(s) before exit");
    }
    Ok(())
}

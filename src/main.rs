use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{ArgGroup, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod catalogue;
mod clock;
mod config;
mod db;
mod error;
mod gateway;
#[cfg(test)]
mod memory;
mod models;
mod pending;
mod report;
mod scoring;
mod shop;

use catalogue::BehaviorCatalogue;
use clock::{Clock, SystemClock};
use config::{EngineConfig, Settings};
use db::PgGateway;
use gateway::Gateway;
use models::{CategoryKind, ClassId, StudentId};
use scoring::{RolloverOutcome, ScoringEngine};
use shop::ShopCatalogue;

#[derive(Parser)]
#[command(name = "classroom-rewards")]
#[command(about = "Classroom behavior points, end-of-day rollover and rewards shop", long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a demo class with the default catalogue and shop
    Seed,
    /// Import students into a class from a CSV file
    ImportRoster {
        #[arg(long)]
        class_id: ClassId,
        #[arg(long)]
        csv: PathBuf,
    },
    /// Show the class roster with daily and weekly points
    Students {
        #[arg(long)]
        class_id: ClassId,
        #[arg(long)]
        json: bool,
    },
    /// Adjust a student's daily points
    #[command(group(
        ArgGroup::new("source")
            .args(["subcategory_id", "points"])
            .required(true)
            .multiple(false)
    ))]
    Award {
        #[arg(long)]
        class_id: ClassId,
        #[arg(long)]
        student_id: StudentId,
        /// Use the points and labels of an enabled subcategory
        #[arg(long)]
        subcategory_id: Option<i64>,
        /// Apply a custom delta instead of a subcategory
        #[arg(long, allow_negative_numbers = true)]
        points: Option<i32>,
        #[arg(long, default_value = "Manual")]
        category: String,
        #[arg(long, default_value = "Teacher adjustment")]
        reason: String,
    },
    /// List a student's action log, newest first
    Logs {
        #[arg(long)]
        student_id: StudentId,
        #[arg(long)]
        limit: Option<i64>,
        #[arg(long)]
        json: bool,
    },
    /// Revert one action log entry
    Undo {
        #[arg(long)]
        class_id: ClassId,
        #[arg(long)]
        student_id: StudentId,
        #[arg(long)]
        entry: Uuid,
    },
    /// Bank daily points into weekly points and start a new day
    EndDay {
        #[arg(long)]
        class_id: ClassId,
        #[arg(long)]
        json: bool,
    },
    /// Zero weekly points and the class counter
    ResetWeek {
        #[arg(long)]
        class_id: ClassId,
    },
    /// Show the behavior catalogue for a class
    Catalogue {
        #[arg(long)]
        class_id: ClassId,
        #[arg(long)]
        json: bool,
    },
    /// Enable or disable categories and subcategories for a class
    Select {
        #[arg(long)]
        class_id: ClassId,
        #[arg(long, value_delimiter = ',')]
        enable_category: Vec<i64>,
        #[arg(long, value_delimiter = ',')]
        disable_category: Vec<i64>,
        #[arg(long, value_delimiter = ',')]
        enable_subcategory: Vec<i64>,
        #[arg(long, value_delimiter = ',')]
        disable_subcategory: Vec<i64>,
    },
    /// Manage behavior categories and subcategories
    Category {
        #[command(subcommand)]
        action: CategoryAction,
    },
    /// Show the shop for a class
    Shop {
        #[arg(long)]
        class_id: ClassId,
        /// Include items not offered to the class
        #[arg(long)]
        all: bool,
    },
    /// Offer or withdraw a shop item for a class
    ShopSelect {
        #[arg(long)]
        class_id: ClassId,
        #[arg(long)]
        item_id: i64,
        #[arg(long)]
        off: bool,
    },
    /// Spend a student's weekly points on a shop item
    Purchase {
        #[arg(long)]
        class_id: ClassId,
        #[arg(long)]
        student_id: StudentId,
        #[arg(long)]
        item_id: i64,
        /// Allow the purchase to take weekly points below zero
        #[arg(long)]
        allow_overdraft: bool,
    },
    /// Generate a markdown class report
    Report {
        #[arg(long)]
        class_id: ClassId,
        #[arg(long, default_value_t = 10)]
        activity: i64,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[derive(Subcommand)]
enum CategoryAction {
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        kind: CategoryKind,
    },
    Edit {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        name: String,
        #[arg(long)]
        kind: CategoryKind,
    },
    Remove {
        #[arg(long)]
        id: i64,
    },
    AddSub {
        #[arg(long)]
        category_id: i64,
        #[arg(long)]
        name: String,
        #[arg(long, allow_negative_numbers = true)]
        points: i32,
    },
    EditSub {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        name: String,
        #[arg(long, allow_negative_numbers = true)]
        points: i32,
    },
    RemoveSub {
        #[arg(long)]
        id: i64,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let database_url = cli
        .settings
        .database_url
        .clone()
        .context("DATABASE_URL must be set to a Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(cli.settings.max_connections)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    let config = EngineConfig::from(&cli.settings);
    let gateway: Arc<dyn Gateway> = Arc::new(PgGateway::new(pool.clone()));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let engine = || ScoringEngine::new(gateway.clone(), clock.clone(), config.clone());
    let behavior = || BehaviorCatalogue::new(gateway.clone(), clock.clone(), config.catalogue_ttl);
    let shop = || ShopCatalogue::new(gateway.clone(), clock.clone(), config.catalogue_ttl);

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let class_id = db::seed(&pool).await?;
            println!("Seed data inserted for class {class_id}.");
        }
        Commands::ImportRoster { class_id, csv } => {
            let inserted = db::import_roster(&pool, class_id, &csv).await?;
            println!("Imported {inserted} students from {}.", csv.display());
        }
        Commands::Students { class_id, json } => {
            let mut engine = engine();
            engine.load(class_id).await?;
            let students: Vec<_> = engine.students().collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&students)?);
                return Ok(());
            }
            if let Some(class) = engine.class() {
                println!("{} (class points {})", class.name, class.points);
            }
            for student in students {
                println!(
                    "- [{}] {}: daily {}, weekly {}",
                    student.id, student.name, student.daily_points, student.weekly_points
                );
            }
            if engine.can_rollover() {
                println!("End of day has not run yet today.");
            }
        }
        Commands::Award {
            class_id,
            student_id,
            subcategory_id,
            points,
            category,
            reason,
        } => {
            let (points, category, subcategory) = match (subcategory_id, points) {
                (Some(subcategory_id), _) => {
                    let mut catalogue = behavior();
                    catalogue.load(Some(class_id)).await?;
                    let (category, subcategory) = catalogue
                        .find_subcategory(subcategory_id)
                        .with_context(|| format!("subcategory {subcategory_id} not found"))?;
                    if !subcategory.is_selected {
                        bail!("subcategory {subcategory_id} is not enabled for class {class_id}");
                    }
                    (
                        subcategory.points,
                        category.name.clone(),
                        subcategory.name.clone(),
                    )
                }
                (None, Some(points)) => (points, category, reason),
                (None, None) => bail!("either --subcategory-id or --points is required"),
            };

            let mut engine = engine();
            engine.load(class_id).await?;
            let entry = engine
                .apply_score_delta(student_id, points, &category, &subcategory)
                .await?;
            let total = engine.student(student_id).map_or(0, |s| s.daily_points);
            println!(
                "{:+} for {category} / {subcategory}; daily points now {total} (entry {}).",
                entry.points, entry.id
            );
        }
        Commands::Logs {
            student_id,
            limit,
            json,
        } => {
            let logs = engine().student_logs(student_id, limit).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&logs)?);
            } else if logs.is_empty() {
                println!("No actions recorded.");
            } else {
                for entry in logs {
                    println!(
                        "- {} {:+} {} / {} ({})",
                        entry.created_at.format("%Y-%m-%d %H:%M"),
                        entry.points,
                        entry.category,
                        entry.subcategory,
                        entry.id
                    );
                }
            }
        }
        Commands::Undo {
            class_id,
            student_id,
            entry,
        } => {
            let mut engine = engine();
            engine.load(class_id).await?;
            let logs = engine.student_logs(student_id, None).await?;
            let Some(log_entry) = logs.into_iter().find(|log| log.id == entry) else {
                bail!("entry {entry} not found for student {student_id}");
            };
            if !engine.undo(&log_entry, student_id).await {
                bail!("failed to undo entry {entry}");
            }
            let total = engine.student(student_id).map_or(0, |s| s.daily_points);
            println!("Undone; daily points now {total}.");
        }
        Commands::EndDay { class_id, json } => {
            let mut engine = engine();
            engine.load(class_id).await?;
            match engine.end_of_day_rollover().await? {
                RolloverOutcome::AlreadyRolledOver(day) => {
                    println!("End of day already ran on {day}.");
                }
                RolloverOutcome::Completed(summary) if json => {
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                }
                RolloverOutcome::Completed(summary) => {
                    for student in summary.rolled.iter() {
                        println!(
                            "- {}: {} daily -> +{} weekly ({} total)",
                            student.name,
                            student.daily_points,
                            student.weekly_increase,
                            student.weekly_points
                        );
                    }
                    if !summary.failed.is_empty() {
                        println!("Failed to update students: {:?}", summary.failed);
                    }
                    println!("Class points now {}.", summary.class_points);
                }
            }
        }
        Commands::ResetWeek { class_id } => {
            let mut engine = engine();
            engine.load(class_id).await?;
            let summary = engine.reset_weekly_scores().await?;
            println!("Reset {} students.", summary.reset);
            if !summary.failed.is_empty() {
                println!("Failed to reset students: {:?}", summary.failed);
            }
        }
        Commands::Catalogue { class_id, json } => {
            let mut catalogue = behavior();
            catalogue.load(Some(class_id)).await?;
            if json {
                let value = serde_json::json!({
                    "categories": catalogue.categories(),
                    "subcategories": catalogue.subcategories(),
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
                return Ok(());
            }
            for category in catalogue.categories() {
                println!(
                    "[{}] {} ({}){}",
                    category.id,
                    category.name,
                    category.kind,
                    if category.is_selected { "" } else { " - disabled" }
                );
                for subcategory in catalogue.subcategories_of(category.id) {
                    println!(
                        "    [{}] {} {:+}{}",
                        subcategory.id,
                        subcategory.name,
                        subcategory.points,
                        if subcategory.is_selected { "" } else { " - disabled" }
                    );
                }
            }
        }
        Commands::Select {
            class_id,
            enable_category,
            disable_category,
            enable_subcategory,
            disable_subcategory,
        } => {
            let mut catalogue = behavior();
            catalogue.load(Some(class_id)).await?;

            let wanted = |ids: Vec<i64>, selected: bool| {
                ids.into_iter().map(move |id| (id, selected))
            };
            let current: Vec<(i64, bool)> = catalogue
                .categories()
                .iter()
                .map(|c| (c.id, c.is_selected))
                .collect();
            for (id, selected) in wanted(enable_category, true).chain(wanted(disable_category, false)) {
                if current.iter().any(|&(cid, is)| cid == id && is != selected) {
                    catalogue.toggle_category(id, selected);
                }
            }
            let current: Vec<(i64, bool)> = catalogue
                .subcategories()
                .iter()
                .map(|s| (s.id, s.is_selected))
                .collect();
            for (id, selected) in
                wanted(enable_subcategory, true).chain(wanted(disable_subcategory, false))
            {
                if current.iter().any(|&(sid, is)| sid == id && is != selected) {
                    catalogue.toggle_subcategory(id, selected);
                }
            }

            if !catalogue.has_unsaved_changes() {
                println!("Nothing to change.");
                return Ok(());
            }
            let categories = catalogue.pending_categories().len();
            let subcategories = catalogue.pending_subcategories().len();
            catalogue.commit(class_id).await?;
            println!("Saved {categories} category and {subcategories} subcategory changes.");
        }
        Commands::Category { action } => {
            let mut catalogue = behavior();
            match action {
                CategoryAction::Add { name, kind } => {
                    let category = catalogue.add_category(&name, kind).await?;
                    println!("Added category {} ({}).", category.id, category.name);
                }
                CategoryAction::Edit { id, name, kind } => {
                    catalogue.update_category(id, &name, kind).await?;
                    println!("Updated category {id}.");
                }
                CategoryAction::Remove { id } => {
                    catalogue.delete_category(id).await?;
                    println!("Removed category {id} and its subcategories.");
                }
                CategoryAction::AddSub {
                    category_id,
                    name,
                    points,
                } => {
                    let subcategory = catalogue
                        .add_subcategory(category_id, &name, points)
                        .await?;
                    println!("Added subcategory {} ({}).", subcategory.id, subcategory.name);
                }
                CategoryAction::EditSub { id, name, points } => {
                    catalogue.update_subcategory(id, &name, points).await?;
                    println!("Updated subcategory {id}.");
                }
                CategoryAction::RemoveSub { id } => {
                    catalogue.delete_subcategory(id).await?;
                    println!("Removed subcategory {id}.");
                }
            }
        }
        Commands::Shop { class_id, all } => {
            let mut shop = shop();
            shop.load(Some(class_id)).await?;
            let items = if all { shop.items() } else { shop.selected_items() };
            if items.is_empty() {
                println!("No items offered.");
            }
            for item in items {
                println!(
                    "[{}] {}: {} points{}",
                    item.id,
                    item.name,
                    item.cost,
                    if item.is_selected { "" } else { " - not offered" }
                );
            }
        }
        Commands::ShopSelect {
            class_id,
            item_id,
            off,
        } => {
            let mut shop = shop();
            shop.load(Some(class_id)).await?;
            shop.set_item_selection(class_id, item_id, !off).await?;
            println!(
                "Item {item_id} {} class {class_id}.",
                if off { "withdrawn from" } else { "offered to" }
            );
        }
        Commands::Purchase {
            class_id,
            student_id,
            item_id,
            allow_overdraft,
        } => {
            let mut shop = shop();
            shop.load(Some(class_id)).await?;
            let item = shop
                .find(item_id)
                .filter(|item| item.is_selected)
                .cloned()
                .with_context(|| format!("item {item_id} is not offered to class {class_id}"))?;

            let mut engine = engine();
            engine.load(class_id).await?;
            let balance = engine
                .student(student_id)
                .map(|s| s.weekly_points)
                .with_context(|| format!("student {student_id} is not in class {class_id}"))?;
            if balance < item.cost && !allow_overdraft {
                bail!(
                    "{} costs {} but only {balance} weekly points are available",
                    item.name,
                    item.cost
                );
            }

            engine.purchase(student_id, &item).await?;
            let remaining = engine.student(student_id).map_or(0, |s| s.weekly_points);
            println!("Purchased {}; {remaining} weekly points left.", item.name);
        }
        Commands::Report {
            class_id,
            activity,
            out,
        } => {
            let mut engine = engine();
            engine.load(class_id).await?;
            let feed = engine.class_logs(activity).await?;
            let class = engine
                .class()
                .context("class missing after load")?;
            let students: Vec<_> = engine.students().collect();
            let report = report::build_report(
                class,
                &students,
                &feed,
                clock.now().date_naive(),
            );
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

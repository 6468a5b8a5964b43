mod clock;
mod companion;
mod completion;
mod config;
mod db;
mod error;
mod events;
mod hub;
mod models;
mod orchestrator;
mod resolve;
mod schedule;
mod store;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use completion::GeminiClient;
use config::Config;
use db::Database;
use hub::LearningHub;
use models::{ChatMessage, ChatRole, JsonOutput, LearningModule};
use orchestrator::{ApplyOutcome, ModuleUpdateCall};
use schedule::ProgressUpdate;

#[derive(Parser)]
#[command(name = "mindhub")]
#[command(about = "Spaced-repetition learning companion with model-driven progress updates")]
#[command(version)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging on stderr (RUST_LOG overrides)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Manage learning modules
    #[command(subcommand)]
    Module(ModuleCommands),

    /// Record exercise progress for a module
    Exercise {
        /// Module id or name
        module: String,

        /// Exercises to add (negative to remove)
        #[arg(long, short, allow_negative_numbers = true)]
        delta: Option<i64>,

        /// Set the completion percentage directly
        #[arg(long, short, allow_negative_numbers = true)]
        percent: Option<f64>,
    },

    /// Mark a scheduled review as completed
    Review {
        /// Module id or name
        module: String,
    },

    /// List modules due for review
    Due,

    /// Suggest the next module to work on (stochastic selection)
    Next,

    /// Show learning statistics
    Stats,

    /// Apply an updateLearningModule call given as JSON arguments
    Apply {
        /// e.g. '{"moduleName":"Physics","exercisesDelta":2}'
        args: String,
    },

    /// Talk to the learning companion
    Chat {
        message: String,

        /// Forget the stored conversation first
        #[arg(long)]
        reset: bool,
    },

    /// Daily briefing on due reviews
    Briefing {
        /// Current energy level in percent
        #[arg(long, short)]
        energy: Option<u8>,
    },
}

#[derive(Subcommand)]
enum ModuleCommands {
    /// List all modules
    List,

    /// Add a new module
    Add {
        /// Module name
        name: String,

        /// Module description
        #[arg(long, short)]
        description: Option<String>,

        /// Number of exercises in the module (default 20)
        #[arg(long, short)]
        total: Option<u32>,
    },

    /// Show module details
    Show {
        /// Module id or name
        module: String,
    },

    /// Delete a module
    Delete {
        /// Module id or name
        module: String,
    },

    /// Attach a PDF summary link (omit the URL to clear it)
    Attach {
        /// Module id or name
        module: String,

        url: Option<String>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "mindhub=debug" } else { "mindhub=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn print_json<T: serde::Serialize>(data: T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string(&JsonOutput::ok(data))?);
    Ok(())
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let db_path = config.db_path();
    let db = Database::open(&db_path)?;
    db.init()?;

    let mut hub = LearningHub::new(db).with_policy(config.ambiguity);
    tracing::debug!(db = %db_path.display(), policy = hub.policy().as_str(), "hub ready");

    match cli.command {
        Commands::Init => {
            if cli.json {
                print_json(serde_json::json!({ "database": db_path }))?;
            } else {
                println!("Database initialized at: {}", db_path.display());
            }
        }

        Commands::Module(module_cmd) => match module_cmd {
            ModuleCommands::List => {
                let modules = hub.modules()?;
                if cli.json {
                    print_json(&modules)?;
                } else if modules.is_empty() {
                    println!("No modules found.");
                } else {
                    println!("{:<10} {:<32} {:>5} {:>9}  STAGE", "ID", "NAME", "DONE", "EXERCISES");
                    println!("{}", "-".repeat(72));
                    for m in modules {
                        println!(
                            "{:<10} {:<32} {:>4}% {:>9}  {}",
                            short_id(&m.id),
                            truncate(&m.name, 30),
                            m.completion_percentage,
                            format!("{}/{}", m.exercises_completed, m.exercises_total),
                            m.review_stage.label()
                        );
                    }
                }
            }

            ModuleCommands::Add {
                name,
                description,
                total,
            } => {
                let module = hub.add_module(&name, description.as_deref().unwrap_or(""), total)?;
                if cli.json {
                    print_json(&module)?;
                } else {
                    println!("Added module '{}' with ID: {}", module.name, module.id);
                }
            }

            ModuleCommands::Show { module } => {
                let m = hub.module(&module)?;
                if cli.json {
                    print_json(&m)?;
                } else {
                    print_module(&m);
                }
            }

            ModuleCommands::Delete { module } => {
                let removed = hub.delete_module(&module)?;
                if cli.json {
                    print_json(&removed)?;
                } else {
                    println!("Module '{}' deleted.", removed.name);
                }
            }

            ModuleCommands::Attach { module, url } => {
                let m = hub.attach_summary(&module, url)?;
                if cli.json {
                    print_json(&m)?;
                } else {
                    match &m.pdf_summary_url {
                        Some(url) => println!("Attached summary to '{}': {}", m.name, url),
                        None => println!("Cleared summary for '{}'.", m.name),
                    }
                }
            }
        },

        Commands::Exercise {
            module,
            delta,
            percent,
        } => {
            let update = ProgressUpdate {
                delta,
                percentage: percent,
            };
            if update.is_empty() {
                return Err("Nothing to record. Use --delta and/or --percent".into());
            }

            let before = hub.module(&module)?;
            let m = hub.record_exercise(&module, update)?;
            if cli.json {
                print_json(&m)?;
            } else {
                println!(
                    "{}: {}% ({}/{} exercises)",
                    m.name, m.completion_percentage, m.exercises_completed, m.exercises_total
                );
                if m.review_stage != before.review_stage {
                    println!("Module complete. First review scheduled: {}", format_date(&m));
                }
            }
        }

        Commands::Review { module } => {
            let m = hub.complete_review(&module)?;
            if cli.json {
                print_json(&m)?;
            } else {
                println!("Review recorded for '{}'.", m.name);
                println!("Stage: {}", m.review_stage.label());
                if m.next_review_date.is_some() {
                    println!("Next review scheduled: {}", format_date(&m));
                }
            }
        }

        Commands::Due => {
            let due = hub.due_modules()?;
            if cli.json {
                print_json(&due)?;
            } else if due.is_empty() {
                println!("Nothing due for review.");
            } else {
                let now = hub.now();
                println!("{:<10} {:<32} {:<12} OVERDUE", "ID", "NAME", "STAGE");
                println!("{}", "-".repeat(66));
                for m in due {
                    println!(
                        "{:<10} {:<32} {:<12} {}d",
                        short_id(&m.id),
                        truncate(&m.name, 30),
                        m.review_stage.label(),
                        schedule::overdue_days(&m, now)
                    );
                }
            }
        }

        Commands::Next => {
            if let Some(m) = hub.next_module()? {
                if cli.json {
                    print_json(&m)?;
                } else {
                    println!("=== Next Module ===");
                    println!();
                    print_module(&m);
                    println!();
                    if schedule::is_due(&m, hub.now()) {
                        println!("After reviewing, record it with:");
                        println!("  mindhub review {}", m.id);
                    } else {
                        println!("After practising, record progress with:");
                        println!("  mindhub exercise {} --delta <n>", m.id);
                    }
                }
            } else if cli.json {
                print_json(())?;
            } else {
                println!("Nothing to do right now. Add a module or wait for the next review.");
            }
        }

        Commands::Stats => {
            let stats = hub.stats()?;
            if cli.json {
                print_json(&stats)?;
            } else {
                println!("=== Learning Statistics ===");
                println!("Total modules: {}", stats.total_modules);
                println!("In review: {}", stats.in_review);
                println!("Mastered: {}", stats.mastered);
                println!("Due for review: {}", stats.due_now);
                println!("Reviews completed: {}", stats.total_reviews);
                println!("Average completion: {:.1}%", stats.avg_completion);
            }
        }

        Commands::Apply { args } => {
            let value: serde_json::Value = serde_json::from_str(&args)?;
            let outcome = hub.apply_tool_call(&ModuleUpdateCall::from_args(&value))?;
            if cli.json {
                print_json(&outcome)?;
            } else {
                print_outcome(&outcome);
            }
        }

        Commands::Chat { message, reset } => {
            if reset {
                let removed = hub.store().clear_chat()?;
                tracing::info!(removed, "chat history cleared");
            }

            let client = GeminiClient::new(&config.completion)?;
            let window = config.completion.history_window;
            let history = hub.store().recent_chat_messages(window)?;
            let turn = companion::converse(&mut hub, &client, &history, &message, window)?;

            hub.store().append_chat_message(&ChatMessage {
                role: ChatRole::User,
                text: message,
                timestamp: hub.now(),
            })?;
            if !turn.degraded {
                hub.store().append_chat_message(&ChatMessage {
                    role: ChatRole::Model,
                    text: turn.reply.clone(),
                    timestamp: hub.now(),
                })?;
            }

            if cli.json {
                print_json(&turn)?;
            } else {
                for outcome in &turn.outcomes {
                    print_outcome(outcome);
                }
                println!("{}", turn.reply);
            }
        }

        Commands::Briefing { energy } => {
            let client = GeminiClient::new(&config.completion)?;
            let briefing = companion::daily_briefing(&hub, &client, energy)?;
            if cli.json {
                print_json(&briefing)?;
            } else {
                println!("{}", briefing);
            }
        }
    }

    Ok(())
}

fn print_module(m: &LearningModule) {
    println!("Module: {}", m.name);
    println!("ID: {}", m.id);
    if !m.description.is_empty() {
        println!("Description: {}", m.description);
    }
    println!(
        "Progress: {}% ({}/{} exercises)",
        m.completion_percentage, m.exercises_completed, m.exercises_total
    );
    println!("Stage: {} ({})", m.review_stage.label(), m.review_stage.as_u8());
    if m.next_review_date.is_some() {
        println!("Next review: {}", format_date(m));
    }
    if let Some(url) = &m.pdf_summary_url {
        println!("Summary: {}", url);
    }
    println!("Last studied: {}", m.last_studied.format("%Y-%m-%d %H:%M"));
    if !m.review_history.is_empty() {
        println!("Reviews:");
        for r in &m.review_history {
            println!("  {}  {}", r.date.format("%Y-%m-%d"), r.stage.label());
        }
    }
}

fn print_outcome(outcome: &ApplyOutcome) {
    match outcome {
        ApplyOutcome::Updated { modules } => {
            for m in modules {
                println!(
                    "Updated '{}': {}%, {}",
                    m.name,
                    m.completion_percentage,
                    m.review_stage.label()
                );
            }
        }
        ApplyOutcome::Ambiguous { candidates } => {
            println!("Several modules match, nothing was changed:");
            for c in candidates {
                println!("  {}  {}", c.id, c.name);
            }
        }
        ApplyOutcome::NotFound { query } => println!("No module matches '{}'.", query),
        ApplyOutcome::NoChange => println!("Nothing to update."),
    }
}

fn format_date(m: &LearningModule) -> String {
    m.next_review_date
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

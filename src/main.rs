use std::path::Path;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use renoboard::board::BoardFilter;
use renoboard::commands::create::PropertyFields;
use renoboard::crm::CrmRecord;
use renoboard::model::{ChecklistKind, Phase};
use renoboard::output::Format;
use renoboard::phase::Action;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_ENV: &str = "RENO_LOG";

#[derive(Parser)]
#[command(
    name = "reno",
    version,
    about = "Renovation pipeline board kept in sync with the CRM"
)]
struct Cli {
    /// Output format
    #[arg(long, global = true, value_enum, default_value = "json")]
    format: Format,
    /// Shorthand for --format pretty
    #[arg(long, global = true, hide = true)]
    pretty: bool,
    /// Debug logging on stderr (overridden by RENO_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Debug, Default)]
struct FieldArgs {
    /// Street address
    #[arg(long)]
    address: Option<String>,
    /// Area or neighbourhood
    #[arg(long)]
    area: Option<String>,
    /// Renovation partner
    #[arg(long)]
    renovator: Option<String>,
    /// Technical constructor
    #[arg(long)]
    constructor: Option<String>,
}

impl From<FieldArgs> for PropertyFields {
    fn from(args: FieldArgs) -> Self {
        Self {
            address: args.address,
            area: args.area,
            renovator: args.renovator,
            technical_constructor: args.constructor,
        }
    }
}

#[derive(clap::Args, Debug, Default)]
struct FilterArgs {
    /// Only properties with this renovator (case-insensitive)
    #[arg(long)]
    renovator: Option<String>,
    /// Only properties with this technical constructor (case-insensitive)
    #[arg(long)]
    constructor: Option<String>,
    /// Only properties in this area (case-insensitive)
    #[arg(long)]
    area: Option<String>,
    /// Substring match on Unique ID or address
    #[arg(long)]
    search: Option<String>,
}

impl From<FilterArgs> for BoardFilter {
    fn from(args: FilterArgs) -> Self {
        Self {
            renovator: args.renovator,
            constructor: args.constructor,
            area: args.area,
            search: args.search,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new .reno/ workspace in the current directory
    Init,
    /// Register a property in the local store
    Create {
        /// Unique ID shared with the CRM
        unique_id: String,
        #[command(flatten)]
        fields: FieldArgs,
    },
    /// Display a single property
    Show {
        /// Unique ID, UUID or UUID prefix
        id: String,
    },
    /// List properties
    List {
        /// Only properties in this phase
        #[arg(long, value_enum)]
        phase: Option<Phase>,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Edit descriptive fields of a property
    Edit {
        id: String,
        #[command(flatten)]
        fields: FieldArgs,
        /// Estimated visit date (YYYY-MM-DD)
        #[arg(long)]
        visit_date: Option<NaiveDate>,
    },
    /// Delete a property from the local store
    Delete { id: String },
    /// Move a property one step down the pipeline
    Act {
        id: String,
        #[arg(value_enum)]
        action: Action,
        /// Estimated visit date for schedule-visit (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Phase corrections and label lookups
    Phase {
        #[command(subcommand)]
        action: PhaseAction,
    },
    /// Status alias table
    Aliases {
        #[command(subcommand)]
        action: AliasAction,
    },
    /// Inspection checklists
    Checklist {
        #[command(subcommand)]
        action: ChecklistAction,
    },
    /// Phase history of a property
    Log { id: String },
    /// Print the Kanban board
    Board {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Interactive Kanban board
    Tui {
        /// Initial search query
        #[arg(long)]
        query: Option<String>,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Pull CRM records into the local store
    Sync,
    /// Compare CRM and local phases (exit 2 on mismatches)
    Reconcile {
        /// Overwrite local phases with the CRM's
        #[arg(long)]
        apply: bool,
    },
    /// Finish phase writes interrupted after the CRM update
    Resume,
    /// Budget text tools
    Budget {
        #[command(subcommand)]
        action: BudgetAction,
    },
    /// Direct CRM access
    Crm {
        #[command(subcommand)]
        action: CrmAction,
    },
    /// Check workspace, store and CRM health, exit 0/1
    Doctor,
}

#[derive(Subcommand)]
enum PhaseAction {
    /// Manually set a property's phase
    Set {
        id: String,
        #[arg(value_enum)]
        phase: Phase,
        /// Reason recorded in the history
        #[arg(long)]
        reason: Option<String>,
    },
    /// Classify CRM status text
    Classify { text: String },
    /// List canonical labels
    Labels,
}

#[derive(Subcommand)]
enum AliasAction {
    /// Validate the configured alias table
    Check {
        /// Also print every alias
        #[arg(long)]
        list: bool,
    },
}

#[derive(Subcommand)]
enum ChecklistAction {
    /// Store a checklist from a JSON file (`-` for stdin)
    Set {
        id: String,
        #[arg(value_enum)]
        kind: ChecklistKind,
        file: String,
    },
    /// Show checklist progress
    Show {
        id: String,
        #[arg(value_enum)]
        kind: Option<ChecklistKind>,
    },
}

#[derive(Subcommand)]
enum BudgetAction {
    /// Extract categories and activities from a text budget (`-` for stdin)
    Extract { file: String },
}

#[derive(Subcommand)]
enum CrmAction {
    /// List CRM records with their mapped phase
    List,
    /// Overwrite a record's status text in the CRM
    SetStatus { unique_id: String, status: String },
    /// Add or replace a record in the snapshot CRM
    Add {
        unique_id: String,
        status: String,
        #[command(flatten)]
        fields: FieldArgs,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}

fn run(cli: Cli, format: Format) -> renoboard::error::Result<()> {
    // Commands dispatched before `.reno` discovery
    match &cli.command {
        Commands::Init => {
            let cwd = std::env::current_dir()?;
            return renoboard::commands::init::run(&cwd);
        }
        Commands::Doctor => return renoboard::commands::doctor::run(format),
        Commands::Phase {
            action: PhaseAction::Classify { text },
        } => return renoboard::commands::phase::classify(text, format),
        Commands::Phase {
            action: PhaseAction::Labels,
        } => return renoboard::commands::phase::labels(format),
        Commands::Budget {
            action: BudgetAction::Extract { file },
        } => return renoboard::commands::budget::extract(file, format),
        _ => {}
    }

    let root = renoboard::store::repo::find_repo_root()?;
    dispatch(&root, cli.command, format)
}

fn dispatch(root: &Path, command: Commands, format: Format) -> renoboard::error::Result<()> {
    use renoboard::commands;

    match command {
        Commands::Init | Commands::Doctor | Commands::Budget { .. } => unreachable!(),
        Commands::Create { unique_id, fields } => {
            commands::create::run(root, unique_id, fields.into(), format)
        }
        Commands::Show { id } => commands::show::run(root, &id, format),
        Commands::List { phase, filter } => commands::list::run(root, phase, filter.into(), format),
        Commands::Edit {
            id,
            fields,
            visit_date,
        } => commands::edit::run(root, &id, fields.into(), visit_date, format),
        Commands::Delete { id } => commands::delete::run(root, &id, format),
        Commands::Act { id, action, date } => commands::act::run(root, &id, action, date, format),
        Commands::Phase { action } => match action {
            PhaseAction::Set { id, phase, reason } => {
                commands::phase::set(root, &id, phase, reason, format)
            }
            PhaseAction::Classify { .. } | PhaseAction::Labels => unreachable!(),
        },
        Commands::Aliases {
            action: AliasAction::Check { list },
        } => commands::aliases::check(root, list, format),
        Commands::Checklist { action } => match action {
            ChecklistAction::Set { id, kind, file } => {
                commands::checklist::set(root, &id, kind, &file, format)
            }
            ChecklistAction::Show { id, kind } => commands::checklist::show(root, &id, kind, format),
        },
        Commands::Log { id } => commands::log::run(root, &id, format),
        Commands::Board { filter } => commands::board::run(root, filter.into(), format),
        Commands::Tui { query, filter } => commands::tui::run(root, filter.into(), query),
        Commands::Sync => commands::sync::run(root, format),
        Commands::Reconcile { apply } => commands::reconcile::run(root, apply, format),
        Commands::Resume => commands::resume::run(root, format),
        Commands::Crm { action } => match action {
            CrmAction::List => commands::crm::list(root, format),
            CrmAction::SetStatus { unique_id, status } => {
                commands::crm::set_status(root, &unique_id, &status, format)
            }
            CrmAction::Add {
                unique_id,
                status,
                fields,
            } => {
                let record = CrmRecord {
                    address: fields.address,
                    area: fields.area,
                    renovator: fields.renovator,
                    technical_constructor: fields.constructor,
                    ..CrmRecord::new(unique_id, status)
                };
                commands::crm::add(root, record, format)
            }
        },
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let format = if cli.pretty {
        Format::Pretty
    } else {
        cli.format
    };
    if let Err(e) = run(cli, format) {
        match format {
            Format::Json => {
                eprintln!(
                    "{}",
                    serde_json::json!({
                        "error": e.code(),
                        "message": e.to_string()
                    })
                );
            }
            _ => eprintln!("error: {e}"),
        }
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn act_parses_action_and_date() {
        let cli = Cli::try_parse_from([
            "reno",
            "act",
            "SP-1",
            "schedule-visit",
            "--date",
            "2026-03-02",
        ])
        .unwrap();
        match cli.command {
            Commands::Act { id, action, date } => {
                assert_eq!(id, "SP-1");
                assert_eq!(action, Action::ScheduleVisit);
                assert_eq!(date, NaiveDate::from_ymd_opt(2026, 3, 2));
            }
            _ => panic!("expected act"),
        }
    }

    #[test]
    fn pretty_flag_is_global() {
        let cli = Cli::try_parse_from(["reno", "board", "--pretty"]).unwrap();
        assert!(cli.pretty);
    }
}

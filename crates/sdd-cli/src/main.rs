mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    cache::CacheSubcommand, change::ChangeSubcommand, constitution::ConstitutionSubcommand,
    context::ContextSubcommand, reverse::ReverseSubcommand,
};
use sdd_core::SddError;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "sdd",
    about = "Spec-driven development: scaffold, validate, diff and sync markdown specs",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .sdd/ or .git/)
    #[arg(long, global = true, env = "SDD_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Debug logging on stderr
    #[arg(long, global = true, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize sdd in the current project
    Init {
        /// Project name (default: directory name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Create a new feature spec
    New {
        /// Feature name, e.g. `user-auth` or `billing/invoices`
        name: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Prefix the directory with the next feature number
        #[arg(long)]
        numbered: bool,
        /// Also scaffold plan.md
        #[arg(long)]
        plan: bool,
        /// Also scaffold tasks.md
        #[arg(long)]
        tasks: bool,
        /// Comma-separated spec ids this feature depends on
        #[arg(long, value_delimiter = ',')]
        depends_on: Vec<String>,
    },

    /// Scaffold plan.md for a feature
    Plan { id: String },

    /// Scaffold and show tasks.md, or update a task
    Tasks {
        id: String,
        /// Mark a task done
        #[arg(long, conflicts_with_all = ["start", "reset"])]
        done: Option<String>,
        /// Mark a task in progress
        #[arg(long, conflicts_with = "reset")]
        start: Option<String>,
        /// Mark a task not started
        #[arg(long)]
        reset: Option<String>,
    },

    /// Validate one spec file, a spec id (prefix), or the whole project
    Validate {
        target: Option<String>,
        /// Treat warnings as failures
        #[arg(long)]
        strict: bool,
    },

    /// Check whether a feature is ready for its next workflow step
    Prepare { id: String },

    /// Show project or feature status, optionally setting a spec status
    Status {
        id: Option<String>,
        /// New status (draft, review, approved, implementing, implemented, ...)
        #[arg(long, requires = "id")]
        set: Option<String>,
    },

    /// List specs
    List {
        #[arg(long)]
        status: Option<String>,
    },

    /// Match requirement ids against code and test references
    Sync {
        id: Option<String>,
        /// Fail when the sync rate is below this percentage
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Show what depends on a spec and where its requirements are referenced
    Impact { id: String },

    /// Print the dependency graph
    Graph {
        /// Mermaid flowchart output
        #[arg(long)]
        mermaid: bool,
    },

    /// Diff specs between git revisions
    Diff {
        id: Option<String>,
        #[arg(long, default_value = "HEAD")]
        from: String,
        /// Target revision (default: working tree)
        #[arg(long)]
        to: Option<String>,
        /// Only print a per-spec summary
        #[arg(long)]
        stat: bool,
    },

    /// Export specs to html, json or md
    Export {
        id: Option<String>,
        #[arg(long, short = 'f')]
        format: Option<String>,
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Write a project report
    Report {
        #[arg(long, short = 'f')]
        format: Option<String>,
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// Skip the code reference scan
        #[arg(long)]
        no_sync: bool,
    },

    /// Full-text search across specs
    Search {
        #[arg(required = true)]
        query: Vec<String>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Re-validate specs as they change
    Watch,

    /// Manage change proposals
    Change {
        #[command(subcommand)]
        subcommand: ChangeSubcommand,
    },

    /// Show, validate and version the project constitution
    Constitution {
        #[command(subcommand)]
        subcommand: ConstitutionSubcommand,
    },

    /// Focus commands on one spec domain
    Context {
        #[command(subcommand)]
        subcommand: ContextSubcommand,
    },

    /// Draft specs from an existing codebase
    Reverse {
        #[command(subcommand)]
        subcommand: ReverseSubcommand,
    },

    /// Inspect or clear the parsed-spec cache
    Cache {
        #[command(subcommand)]
        subcommand: CacheSubcommand,
    },
}

fn exit_code(e: &anyhow::Error) -> i32 {
    if e.chain().any(|c| c.is::<cmd::ValidationFailed>()) {
        return 2;
    }
    if let Some(err) = e.chain().find_map(|c| c.downcast_ref::<SddError>()) {
        return match err {
            SddError::Io(_) => 3,
            err if err.is_validation() => 2,
            err if err.is_git() => 4,
            _ => 1,
        };
    }
    if e.chain().any(|c| c.is::<std::io::Error>()) {
        return 3;
    }
    1
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        match &cli.command {
            Commands::Watch => tracing::Level::INFO,
            _ => tracing::Level::WARN,
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());
    let json = cli.json;

    let result = match cli.command {
        Commands::Init { name } => cmd::init::run(&root, name.as_deref()),
        Commands::New {
            name,
            title,
            description,
            numbered,
            plan,
            tasks,
            depends_on,
        } => cmd::new::run(
            &root,
            &name,
            sdd_core::feature::CreateOptions {
                title,
                description,
                numbered,
                with_plan: plan,
                with_tasks: tasks,
                depends_on,
            },
            json,
        ),
        Commands::Plan { id } => cmd::plan::run(&root, &id, json),
        Commands::Tasks {
            id,
            done,
            start,
            reset,
        } => cmd::tasks::run(&root, &id, cmd::tasks::Update::from_flags(done, start, reset), json),
        Commands::Validate { target, strict } => {
            cmd::validate::run(&root, target.as_deref(), strict, json)
        }
        Commands::Prepare { id } => cmd::prepare::run(&root, &id, json),
        Commands::Status { id, set } => cmd::status::run(&root, id.as_deref(), set.as_deref(), json),
        Commands::List { status } => cmd::list::run(&root, status.as_deref(), json),
        Commands::Sync { id, threshold } => cmd::sync::run(&root, id.as_deref(), threshold, json),
        Commands::Impact { id } => cmd::impact::run(&root, &id, json),
        Commands::Graph { mermaid } => cmd::graph::run(&root, mermaid, json),
        Commands::Diff { id, from, to, stat } => {
            cmd::diff::run(&root, id.as_deref(), &from, to.as_deref(), stat, json)
        }
        Commands::Export { id, format, output } => {
            cmd::export::run(&root, id.as_deref(), format.as_deref(), output.as_deref(), json)
        }
        Commands::Report {
            format,
            output,
            no_sync,
        } => cmd::report::run(&root, format.as_deref(), output.as_deref(), !no_sync, json),
        Commands::Search { query, limit } => cmd::search::run(&root, &query.join(" "), limit, json),
        Commands::Watch => cmd::watch::run(&root),
        Commands::Change { subcommand } => cmd::change::run(&root, subcommand, json),
        Commands::Constitution { subcommand } => cmd::constitution::run(&root, subcommand, json),
        Commands::Context { subcommand } => cmd::context::run(&root, subcommand, json),
        Commands::Reverse { subcommand } => cmd::reverse::run(&root, subcommand, json),
        Commands::Cache { subcommand } => cmd::cache::run(&root, subcommand, json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        match e.chain().find_map(|c| c.downcast_ref::<SddError>()) {
            Some(err) => eprintln!("error[{}]: {e:#}", err.code()),
            None => eprintln!("error: {e:#}"),
        }
        std::process::exit(exit_code(&e));
    }
}

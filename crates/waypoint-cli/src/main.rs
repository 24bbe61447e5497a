mod config;
mod plan_cmds;
mod serve_cmd;

use std::sync::Arc;

use clap::{Parser, Subcommand};

use waypoint_core::collaborators::http::{
    HttpAuthoringClient, HttpContentClient, HttpRetrievalClient,
};
use waypoint_core::orchestrator::{PlanOrchestrator, PlannerConfig};
use waypoint_core::quiz::QuizOrchestrator;
use waypoint_core::skills::CatalogSkillResolver;
use waypoint_db::pool;

use config::WaypointConfig;

#[derive(Parser)]
#[command(name = "waypoint", about = "Learning-path orchestration service")]
struct Cli {
    /// Database URL (overrides WAYPOINT_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a waypoint config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/waypoint")]
        db_url: String,
        /// Base URL of the semantic retrieval service
        #[arg(long, default_value = "http://localhost:8001")]
        retrieval_url: String,
        /// Base URL of the question-authoring service
        #[arg(long, default_value = "http://localhost:8002")]
        authoring_url: String,
        /// Base URL of the content-snippet store
        #[arg(long, default_value = "http://localhost:8003")]
        content_url: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Initialize the waypoint database (requires config file or env vars)
    DbInit,
    /// Run the HTTP service
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Port to listen on
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Plan management
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
}

#[derive(Subcommand)]
enum PlanCommands {
    /// Show plan details
    Show {
        /// Plan ID to show
        plan_id: String,
    },
    /// List plans for a user
    List {
        /// User to list plans for
        #[arg(long, default_value = "anonymous")]
        user: String,
    },
}

/// Execute the `waypoint init` command: write the config file.
fn cmd_init(
    db_url: &str,
    retrieval_url: &str,
    authoring_url: &str,
    content_url: &str,
    force: bool,
) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
        },
        services: config::ServicesSection {
            retrieval_url: retrieval_url.to_string(),
            authoring_url: authoring_url.to_string(),
            content_url: content_url.to_string(),
        },
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!("  services.retrieval_url = {retrieval_url}");
    println!("  services.authoring_url = {authoring_url}");
    println!("  services.content_url = {content_url}");
    println!();
    println!("Next: run `waypoint db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `waypoint db-init` command: create database and run migrations.
async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let resolved = WaypointConfig::resolve(cli_db_url)?;

    println!("Initializing waypoint database...");

    // 1. Create the database if it does not exist.
    pool::ensure_database_exists(&resolved.db_config).await?;

    // 2. Connect to the target database.
    let db_pool = pool::create_pool(&resolved.db_config).await?;

    // 3. Run migrations.
    pool::run_migrations(&db_pool).await?;

    // 4. Print success with table counts.
    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    // 5. Clean shutdown.
    db_pool.close().await;

    println!("waypoint db-init complete.");
    Ok(())
}

/// Execute the `waypoint serve` command: wire the collaborators and serve.
async fn cmd_serve(resolved: WaypointConfig, bind: &str, port: u16) -> anyhow::Result<()> {
    let db_pool = pool::create_pool(&resolved.db_config).await?;

    let quizzes = Arc::new(QuizOrchestrator::new(
        db_pool.clone(),
        Arc::new(HttpContentClient::new(resolved.services.content_url.clone())),
        Arc::new(HttpAuthoringClient::new(
            resolved.services.authoring_url.clone(),
        )),
    ));
    let planner = PlanOrchestrator::new(
        db_pool.clone(),
        Arc::new(HttpRetrievalClient::new(
            resolved.services.retrieval_url.clone(),
        )),
        Arc::new(CatalogSkillResolver::new()),
        Arc::clone(&quizzes),
        PlannerConfig::default(),
    );

    let state = Arc::new(serve_cmd::AppState {
        pool: db_pool,
        planner,
        quizzes,
    });

    serve_cmd::run_serve(state, bind, port).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init {
            db_url,
            retrieval_url,
            authoring_url,
            content_url,
            force,
        } => cmd_init(&db_url, &retrieval_url, &authoring_url, &content_url, force),
        Commands::DbInit => cmd_db_init(cli.database_url.as_deref()).await,
        Commands::Serve { bind, port } => {
            let resolved = WaypointConfig::resolve(cli.database_url.as_deref())?;
            cmd_serve(resolved, &bind, port).await
        }
        Commands::Plan { command } => {
            let resolved = WaypointConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = match command {
                PlanCommands::Show { plan_id } => plan_cmds::cmd_show(&db_pool, &plan_id).await,
                PlanCommands::List { user } => plan_cmds::cmd_list(&db_pool, &user).await,
            };
            db_pool.close().await;
            result
        }
    }
}

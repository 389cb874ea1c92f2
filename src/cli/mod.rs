use anyhow::Result;
use churnwatch::config::Config;
use churnwatch::dashboard::DashboardFilter;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

pub mod commands;

#[derive(Parser)]
#[command(
    name = "churnwatch",
    about = "Customer churn prediction with pre-trained model artifacts",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Authenticated username for this session (defaults to CHURN_USER)
    #[arg(short, long, global = true)]
    pub user: Option<String>,
}

/// Raw field values for a single customer, checked by the feature assembler
#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Model to use ("Gradient Boosting" or "Random Forest")
    #[arg(short, long)]
    pub model: Option<String>,

    #[arg(long)]
    pub gender: String,
    #[arg(long)]
    pub senior_citizen: String,
    #[arg(long)]
    pub partner: String,
    #[arg(long)]
    pub dependents: String,
    /// Months with the company
    #[arg(long)]
    pub tenure: String,
    #[arg(long)]
    pub phone_service: String,
    #[arg(long)]
    pub multiple_lines: String,
    /// DSL, Fiber optic or No
    #[arg(long)]
    pub internet_service: String,
    #[arg(long)]
    pub online_security: String,
    #[arg(long)]
    pub online_backup: String,
    #[arg(long)]
    pub device_protection: String,
    #[arg(long)]
    pub tech_support: String,
    #[arg(long)]
    pub streaming_tv: String,
    #[arg(long)]
    pub streaming_movies: String,
    /// Month-to-month, One year or Two year
    #[arg(long)]
    pub contract: String,
    #[arg(long)]
    pub paperless_billing: String,
    /// Electronic check, Mailed check, Bank transfer (automatic) or Credit card (automatic)
    #[arg(long)]
    pub payment_method: String,
    #[arg(long)]
    pub monthly_charges: String,
    #[arg(long)]
    pub total_charges: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Predict churn for one customer and log it to the history file
    Predict(PredictArgs),

    /// Predict churn for every row of a CSV or spreadsheet upload
    Bulk {
        /// Upload to score (.csv, .xls, .xlsx, .xlsm, .xlsb, .ods)
        #[arg(short, long)]
        file: PathBuf,

        /// Model to use
        #[arg(short, long)]
        model: Option<String>,

        /// Write the scored rows to this CSV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show logged predictions
    History {
        /// Only show the most recent entries
        #[arg(short, long)]
        limit: Option<usize>,

        /// Show per-model totals instead of rows
        #[arg(short, long)]
        summary: bool,
    },

    /// Explore the churn dataset
    Data {
        /// Column selection: all, numeric or categorical
        #[arg(short, long, default_value = "all")]
        columns: String,

        /// Describe a single column
        #[arg(short, long)]
        describe: Option<String>,

        /// Number of rows to print
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Key churn metrics for a filtered slice of the dataset
    Dashboard {
        /// Gender to include (repeatable)
        #[arg(long)]
        gender: Vec<String>,

        /// Payment method to include (repeatable)
        #[arg(long)]
        payment_method: Vec<String>,

        /// Contract to include (repeatable)
        #[arg(long)]
        contract: Vec<String>,
    },

    /// List the configured models and whether their artifacts are present
    Models,

    /// Ensure the label encoder artifact exists and is fitted
    Encoder,

    /// Serve the JSON HTTP API
    Serve {
        /// Override CHURN_SERVER_HOST
        #[arg(long)]
        host: Option<String>,

        /// Override CHURN_SERVER_PORT
        #[arg(short, long)]
        port: Option<u16>,
    },
}

/// Execute CLI command with the loaded configuration
pub async fn run(cli: Cli, mut config: Config) -> Result<()> {
    let user = cli.user.or_else(|| config.session.default_user.clone());
    match cli.command {
        Commands::Predict(args) => {
            info!("Running single prediction");
            commands::predict(&config, user, args)?;
        }
        Commands::Bulk {
            file,
            model,
            output,
        } => {
            info!("Running bulk prediction for {}", file.display());
            commands::bulk(&config, user, file, model, output)?;
        }
        Commands::History { limit, summary } => {
            info!("Reading prediction history");
            commands::history(&config, user, limit, summary)?;
        }
        Commands::Data {
            columns,
            describe,
            limit,
        } => {
            info!("Exploring dataset");
            commands::data(&config, user, columns, describe, limit)?;
        }
        Commands::Dashboard {
            gender,
            payment_method,
            contract,
        } => {
            info!("Computing dashboard metrics");
            let filter = DashboardFilter {
                gender,
                payment_method,
                contract,
            };
            commands::dashboard(&config, user, filter)?;
        }
        Commands::Models => {
            commands::models(&config)?;
        }
        Commands::Encoder => {
            info!("Checking label encoder");
            commands::encoder(&config)?;
        }
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            info!("Starting HTTP API on {}", config.bind_address());
            commands::serve(&config).await?;
        }
    }
    Ok(())
}

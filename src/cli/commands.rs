use anyhow::{Context, Result};
use churnwatch::config::Config;
use churnwatch::dashboard::{build_report, DashboardFilter};
use churnwatch::data::schema::{describe_column, ColumnSelection};
use churnwatch::ml::encoder::load_or_fit;
use churnwatch::ml::{ModelKind, ModelRegistry, DEFAULT_LABELS};
use churnwatch::orchestrator::{PredictionOrchestrator, Session};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use super::PredictArgs;

fn orchestrator(config: &Config) -> Result<PredictionOrchestrator> {
    let registry = Arc::new(ModelRegistry::from_config(config));
    PredictionOrchestrator::from_config(config, registry)
        .context("Invalid CHURN_DEFAULT_MODEL value")
}

fn session(orchestrator: &PredictionOrchestrator, user: Option<String>) -> Session {
    match user {
        Some(user) => orchestrator.session_for(user),
        None => {
            warn!("No user given; set --user or CHURN_USER");
            Session::anonymous(orchestrator.default_model())
        }
    }
}

impl PredictArgs {
    /// Field values keyed by the exact column names
    fn raw_fields(self) -> HashMap<String, String> {
        HashMap::from([
            ("gender".to_string(), self.gender),
            ("SeniorCitizen".to_string(), self.senior_citizen),
            ("Partner".to_string(), self.partner),
            ("Dependents".to_string(), self.dependents),
            ("tenure".to_string(), self.tenure),
            ("PhoneService".to_string(), self.phone_service),
            ("MultipleLines".to_string(), self.multiple_lines),
            ("InternetService".to_string(), self.internet_service),
            ("OnlineSecurity".to_string(), self.online_security),
            ("OnlineBackup".to_string(), self.online_backup),
            ("DeviceProtection".to_string(), self.device_protection),
            ("TechSupport".to_string(), self.tech_support),
            ("StreamingTV".to_string(), self.streaming_tv),
            ("StreamingMovies".to_string(), self.streaming_movies),
            ("Contract".to_string(), self.contract),
            ("PaperlessBilling".to_string(), self.paperless_billing),
            ("PaymentMethod".to_string(), self.payment_method),
            ("MonthlyCharges".to_string(), self.monthly_charges),
            ("TotalCharges".to_string(), self.total_charges),
        ])
    }
}

/// Predict churn for one customer and append it to the history
pub fn predict(config: &Config, user: Option<String>, mut args: PredictArgs) -> Result<()> {
    let orchestrator = orchestrator(config)?;
    let mut session = session(&orchestrator, user);
    let model = orchestrator.select_model(&mut session, args.model.take().as_deref())?;

    info!("🔮 Predicting with {}", model);
    let outcome = orchestrator.predict_single(&mut session, &args.raw_fields())?;

    println!("\n📋 Prediction ({})", outcome.model);
    if outcome.result.will_churn() {
        println!("⚠️  {}", outcome.result.message());
    } else {
        println!("✅ {}", outcome.result.message());
    }
    println!("   Logged to {}", orchestrator.history().path().display());
    Ok(())
}

/// Score every row of an uploaded table
pub fn bulk(
    config: &Config,
    user: Option<String>,
    file: PathBuf,
    model: Option<String>,
    output: Option<PathBuf>,
) -> Result<()> {
    let orchestrator = orchestrator(config)?;
    let mut session = session(&orchestrator, user);
    orchestrator.select_model(&mut session, model.as_deref())?;

    let result = orchestrator
        .predict_bulk(&session, &file)
        .with_context(|| format!("Bulk prediction failed for {}", file.display()))?;

    println!("\n📊 Bulk Prediction ({})", result.model);
    println!("   Rows scored: {}", result.rows.len());
    println!("   Predicted to churn: {}", result.churn_count());
    if result.coerced_cells > 0 {
        println!("   ⚠️  Numeric cells treated as missing: {}", result.coerced_cells);
    }
    if !result.ignored_columns.is_empty() {
        println!("   Ignored columns: {}", result.ignored_columns.join(", "));
    }

    match output {
        Some(path) => {
            result.write_csv(&path)?;
            println!("\n✅ Results written to {}", path.display());
        }
        None => {
            println!();
            for (i, row) in result.rows.iter().enumerate() {
                let id = row.customer_id.clone().unwrap_or_else(|| format!("row {}", i + 1));
                println!("   {:<14} Churn: {:<3} ({:.2}%)", id, row.churn, row.probability);
            }
        }
    }
    Ok(())
}

/// Print logged predictions or their summary
pub fn history(config: &Config, user: Option<String>, limit: Option<usize>, summary: bool) -> Result<()> {
    let orchestrator = orchestrator(config)?;
    let session = session(&orchestrator, user);

    if summary {
        let summary = orchestrator.history_summary(&session)?;
        println!("\n📈 Prediction History");
        println!("   Total predictions: {}", summary.total);
        println!("   Predicted to churn: {}", summary.churn_predictions);
        if let (Some(first), Some(last)) = (summary.first_prediction, summary.last_prediction) {
            println!("   Period: {} to {}", first, last);
        }
        for usage in &summary.by_model {
            println!(
                "   {:<18} {:>5} predictions, {:>5} churn, mean probability {:.2}%",
                usage.model, usage.predictions, usage.churn_predictions, usage.mean_probability
            );
        }
        return Ok(());
    }

    let mut entries = orchestrator.read_history(&session)?;
    if let Some(limit) = limit {
        let skip = entries.len().saturating_sub(limit);
        entries.drain(..skip);
    }
    if entries.is_empty() {
        println!("No predictions logged yet");
        return Ok(());
    }

    println!("\n📜 Prediction History ({} entries)", entries.len());
    for entry in &entries {
        println!(
            "   {}  {:<18} {:<3} {:>6.2}%  tenure {:>3}  {}  {}",
            entry.time_of_prediction,
            entry.model_used,
            entry.prediction,
            entry.probability,
            entry.record.tenure,
            entry.record.contract,
            entry.record.payment_method
        );
    }
    Ok(())
}

/// Print dataset columns and rows
pub fn data(
    config: &Config,
    user: Option<String>,
    columns: String,
    describe: Option<String>,
    limit: usize,
) -> Result<()> {
    let orchestrator = orchestrator(config)?;
    let session = session(&orchestrator, user);

    if let Some(column) = describe {
        session.require_authenticated()?;
        match describe_column(&column) {
            Some(description) => println!("{}: {}", column, description),
            None => println!("❌ Unknown column: {}", column),
        }
        return Ok(());
    }

    let selection = ColumnSelection::parse(&columns)
        .with_context(|| format!("Invalid column selection '{}' (use all, numeric or categorical)", columns))?;
    let dataset = orchestrator.load_dataset(&session)?;
    let (header, rows) = dataset.select(selection);

    println!("\n🗂️  Churn dataset: {} rows", dataset.len());
    println!("{}", header.join(" | "));
    for row in rows.iter().take(limit) {
        println!("{}", row.join(" | "));
    }
    if rows.len() > limit {
        println!("... {} more rows", rows.len() - limit);
    }
    Ok(())
}

/// Print KPIs, tenure trends, distributions and correlations for a filter
pub fn dashboard(config: &Config, user: Option<String>, filter: DashboardFilter) -> Result<()> {
    let orchestrator = orchestrator(config)?;
    let session = session(&orchestrator, user);
    let dataset = orchestrator.load_dataset(&session)?;
    let report = build_report(&dataset, &filter);
    let kpis = &report.kpis;

    let fmt_opt = |v: Option<f64>| v.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "-".to_string());

    println!("\n📊 Churn Dashboard");
    println!("   Total customers: {}", kpis.total_customers);
    println!("   Churned customers: {}", kpis.churned_customers);
    println!("   Churn rate: {:.2}% ({:?})", kpis.churn_rate, kpis.band);
    println!("   Avg monthly charges: {}", fmt_opt(kpis.avg_monthly_charges));
    println!("   Avg total charges: {}", fmt_opt(kpis.avg_total_charges));
    println!("   Avg tenure: {}", fmt_opt(kpis.avg_tenure));

    println!("\n📈 Trends by tenure");
    for point in &report.tenure_trends {
        println!(
            "   {:>3} months  {:>5} customers  monthly {:>8}  churn {:>6.2}%",
            point.tenure,
            point.customers,
            fmt_opt(point.avg_monthly_charges),
            point.churn_rate
        );
    }

    for histogram in [&report.tenure_distribution, &report.monthly_charges_distribution] {
        println!("\n📶 {} distribution (churned / retained)", histogram.column);
        for bin in &histogram.bins {
            println!(
                "   {:>8.2} - {:<8.2} {:>5} / {:<5}",
                bin.lower, bin.upper, bin.churned, bin.retained
            );
        }
    }

    println!("\n🔗 Correlation ({} rows)", report.correlation.rows_used);
    println!("   {:>16} {}", "", report.correlation.columns.join("  "));
    for (name, values) in report.correlation.columns.iter().zip(&report.correlation.values) {
        let cells: Vec<String> = values.iter().map(|v| format!("{:>6.3}", v)).collect();
        println!("   {:>16} {}", name, cells.join("  "));
    }
    Ok(())
}

/// List the configured models
pub fn models(config: &Config) -> Result<()> {
    let registry = ModelRegistry::from_config(config);
    let available = registry.available_models();

    println!("\n🤖 Models");
    for kind in ModelKind::all() {
        let status = if available.contains(&kind) { "✅" } else { "❌ missing" };
        let path = registry
            .artifact_path(kind)
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        println!("   {:<18} {} {}", kind.display_name(), status, path);
    }
    println!("   Default: {}", config.models.default_model);
    Ok(())
}

/// Load the label encoder, fitting and persisting it when needed
pub fn encoder(config: &Config) -> Result<()> {
    let path = &config.paths.label_encoder;
    let (encoder, origin) = load_or_fit(path, &DEFAULT_LABELS)
        .with_context(|| format!("Failed to prepare label encoder at {}", path.display()))?;
    println!("✅ Label encoder {:?}: {}", origin, path.display());
    println!("   Classes: {:?}", encoder.classes().unwrap_or_default());
    Ok(())
}

/// Serve the HTTP API until stopped
pub async fn serve(config: &Config) -> Result<()> {
    churnwatch::server::serve(config).await
}

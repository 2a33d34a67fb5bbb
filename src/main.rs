use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use axum_prometheus::PrometheusMetricLayer;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use psychosafe_ai::config::AppConfig;
use psychosafe_ai::error::AppError;
use psychosafe_ai::telemetry;
use psychosafe_ai::workflows::psychosocial::{
    automation_router, AnswerValue, AssessmentId, AssessmentResponse, AutomationService,
    CategoryCatalog, InMemoryStore, LogTransport, OrgContext, RiskAnalysisBuilder, ScoringEngine,
};
use tracing::info;

#[derive(Clone)]
struct AppState {
    readiness: Arc<AtomicBool>,
    metrics: PrometheusHandle,
}

#[derive(Parser, Debug)]
#[command(
    name = "Psychosocial Risk Automation Service",
    about = "Run the psychosocial risk automation pipeline or score assessments from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Score a completed assessment offline for demos and audits
    Assess {
        #[command(subcommand)]
        command: AssessCommand,
    },
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Subcommand, Debug)]
enum AssessCommand {
    /// Score a response and print the per-category risk breakdown
    Score(ScoreArgs),
}

#[derive(Args, Debug)]
struct ScoreArgs {
    /// JSON file with a completed assessment response (omit for a sample)
    #[arg(long)]
    input: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run_cli().await {
        eprintln!("application error: {err}");
        std::process::exit(1);
    }
}

async fn run_cli() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => run_server(args).await,
        Command::Assess {
            command: AssessCommand::Score(args),
        } => run_score_report(args),
    }
}

async fn run_server(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let state = AppState {
        readiness: readiness_flag.clone(),
        metrics: prometheus_handle,
    };

    let store = Arc::new(InMemoryStore::new());
    let service = Arc::new(AutomationService::new(
        store,
        Arc::new(LogTransport),
        config.queue.clone(),
    ));
    service.start_processing();

    let app = Router::new()
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .with_state(state)
        .merge(automation_router(service))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "psychosocial risk automation service ready");

    axum::serve(listener, app).await?;
    Ok(())
}

fn run_score_report(args: ScoreArgs) -> Result<(), AppError> {
    let response = match args.input {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            serde_json::from_str::<AssessmentResponse>(&raw)?
        }
        None => sample_response(),
    };

    let catalog = Arc::new(CategoryCatalog::standard());
    let engine = ScoringEngine::new(catalog.clone());
    let builder = RiskAnalysisBuilder::new(catalog.clone());

    let items = catalog.resolve_items(&response).map_err(AppError::Scoring)?;
    let scores = engine.score(&items);
    let org = OrgContext::from_response(&response);
    let analyses = builder.build(&response, &scores, &org, Utc::now());

    println!("Psychosocial risk breakdown");
    println!(
        "Response {} — {} ({})",
        response.id.0, org.employee_label, org.sector_label
    );

    for analysis in &analyses {
        let display_name = catalog
            .definition(&analysis.category)
            .map(|def| def.display_name)
            .unwrap_or(analysis.category.as_str());
        println!(
            "\n- {} | score {:.1} | exposição {} | reavaliar em {}",
            display_name,
            analysis.risk_score,
            analysis.exposure_level.label(),
            analysis.next_evaluation_date
        );
        if analysis.mandatory_measures.is_empty() {
            println!("  Medidas obrigatórias: nenhuma");
        } else {
            println!("  Medidas obrigatórias:");
            for measure in &analysis.mandatory_measures {
                println!("  * {measure}");
            }
        }
    }

    Ok(())
}

fn sample_response() -> AssessmentResponse {
    let answers = vec![
        ("dt_01", "demandas_trabalho", 4.0),
        ("dt_02", "demandas_trabalho", 5.0),
        ("dt_03", "demandas_trabalho", 4.0),
        ("dt_04", "demandas_trabalho", 5.0),
        ("dt_05", "demandas_trabalho", 4.0),
        ("ca_01", "controle_autonomia", 4.0),
        ("ca_02", "controle_autonomia", 3.0),
        ("al_01", "apoio_lideranca", 4.0),
        ("al_02", "apoio_lideranca", 4.0),
        ("rr_01", "reconhecimento_recompensa", 2.0),
    ]
    .into_iter()
    .map(|(question_id, category, value)| AnswerValue {
        question_id: question_id.to_string(),
        category: category.to_string(),
        value,
    })
    .collect();

    AssessmentResponse {
        id: AssessmentId("sample-001".to_string()),
        company_id: "demo".to_string(),
        employee_id: "emp-042".to_string(),
        employee_name: Some("Colaborador Exemplo".to_string()),
        sector_id: "sec-atendimento".to_string(),
        sector_name: Some("Atendimento".to_string()),
        role_id: "role-analista".to_string(),
        template_id: "tpl-nr01".to_string(),
        answers,
        raw_score: None,
        completed_at: Utc::now(),
    }
}

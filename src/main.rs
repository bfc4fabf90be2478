use std::sync::Arc;

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use migration::{Migrator, MigratorTrait};
use plangate::authz::boundary::{PdpClient, PolicyBoundary};
use plangate::authz::diagnostics::{NoDiagnostics, QueryDiagnostics, TracingDiagnostics};
use plangate::authz::AuthzContext;
use plangate::{contacts, seed, settings, storage, web};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "plangate",
    version,
    about = "Contact API with plan-based query authorization"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings
    let settings = settings::Settings::load(&cli.config)?;
    tracing::info!(?settings, "Loaded configuration");

    // init storage (database)
    let db = storage::init(&settings.database).await?;
    Migrator::up(&db, None).await.into_diagnostic()?;

    if settings.seed.enabled {
        seed::populate(&db).await?;
    }

    let boundary: Arc<dyn PolicyBoundary> = Arc::new(PdpClient::new(
        &settings.policy.endpoint,
        settings.policy.timeout(),
    )?);
    let diagnostics: Arc<dyn QueryDiagnostics> = if settings.diagnostics.log_plans {
        Arc::new(TracingDiagnostics)
    } else {
        Arc::new(NoDiagnostics)
    };
    let authz = AuthzContext {
        attributes: contacts::schema_map()?,
        resource_kind: contacts::RESOURCE_KIND.to_string(),
        boundary,
        timeout: settings.policy.timeout(),
        diagnostics,
    };
    tracing::info!(
        attributes = authz.attributes.len(),
        pdp = %settings.policy.endpoint,
        "Authorization context ready"
    );

    // start web server
    let state = web::AppState {
        db,
        authz: Arc::new(authz),
    };
    web::serve(&settings, state).await?;
    Ok(())
}

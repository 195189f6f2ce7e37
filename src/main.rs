use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use orcid_sync::config::{self, Config};
use orcid_sync::diagnostics::Diagnostics;
use orcid_sync::notification::{AuthorMailer, LogOnlyMailer, WebhookMailer};
use orcid_sync::oauth::AuthorizationState;
use orcid_sync::store::postgres::PgStore;
use orcid_sync::store::resolver::PublicUrlResolver;
use orcid_sync::{api, AppState};

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::{trace as sdktrace, Resource};

    // before config, so --help works without a database or master key
    let args = cli::Cli::parse();

    // OTLP export only when an endpoint is configured
    let telemetry_layer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic())
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "orcid-sync"),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
            .expect("failed to install OpenTelemetry tracer");
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "orcid_sync=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry_layer)
        .init();

    let cfg = config::load()?;

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => run_server(cfg, port).await,
        Some(cli::Commands::Sync {
            journal_id,
            submission_id,
        }) => {
            let state = build_state(cfg).await?;
            handle_sync_command(&state, journal_id, submission_id).await
        }
        Some(cli::Commands::AuthorizeUrl {
            journal_id,
            redirect_uri,
        }) => {
            let state = build_state(cfg).await?;
            let ctx = state.journal_context(journal_id).await?;
            println!("{}", state.lifecycle.flow().authorize_url(&ctx, &redirect_uri));
            Ok(())
        }
        Some(cli::Commands::Credential { command }) => {
            let state = build_state(cfg).await?;
            handle_credential_command(&state, command).await
        }
        None => {
            let port = cfg.port;
            run_server(cfg, port).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

async fn build_state(cfg: Config) -> anyhow::Result<Arc<AppState>> {
    tracing::info!("Connecting to database...");
    let db = PgStore::connect(&cfg.database_url, &cfg.master_key).await?;

    tracing::info!("Running migrations...");
    db.migrate().await?;

    let db = Arc::new(db);
    let resolver = Arc::new(PublicUrlResolver::new(cfg.public_base_url.clone()));
    let mailer: Arc<dyn AuthorMailer> = match cfg.mail_webhook_url.clone() {
        Some(url) => {
            tracing::info!("Invitations delivered via mail webhook");
            Arc::new(WebhookMailer::new(url, cfg.mail_webhook_secret.clone()))
        }
        None => {
            tracing::warn!("ORCID_SYNC_MAIL_WEBHOOK_URL not set, invitations are only logged");
            Arc::new(LogOnlyMailer)
        }
    };
    let diagnostics = Arc::new(Diagnostics::new(cfg.log_file.clone()));

    Ok(Arc::new(AppState::new(
        cfg,
        db.clone(),
        db,
        resolver,
        mailer,
        diagnostics,
    )))
}

async fn run_server(cfg: Config, port: u16) -> anyhow::Result<()> {
    let state = build_state(cfg).await?;

    let app = api::router(state)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(axum::middleware::from_fn(security_headers_middleware));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("orcid-sync listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Middleware: injects a unique X-Request-Id into every response.
async fn request_id_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let req_id = uuid::Uuid::new_v4().to_string();
    let mut resp = next.run(req).await;
    if let Ok(val) = axum::http::HeaderValue::from_str(&req_id) {
        resp.headers_mut().insert("x-request-id", val);
    }
    resp
}

/// Middleware: security headers on every response. The callback URL
/// carries an invitation token, so referrers are suppressed.
async fn security_headers_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    use axum::http::HeaderValue;

    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();
    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert("Cache-Control", HeaderValue::from_static("no-store"));
    headers.insert("Referrer-Policy", HeaderValue::from_static("no-referrer"));
    headers.remove("Server");
    resp
}

async fn handle_sync_command(
    state: &Arc<AppState>,
    journal_id: i64,
    submission_id: i64,
) -> anyhow::Result<()> {
    let ctx = state.journal_context(journal_id).await?;
    let report = state
        .lifecycle
        .dispatcher()
        .sync(&ctx, submission_id, None)
        .await
        .context("sync failed")?;

    let Some(outcome) = report.outcome() else {
        println!("Submission {} skipped: {:?}", submission_id, report.skip_reason());
        return Ok(());
    };

    println!(
        "{:<14} {:<22} {:<8} {:<8} RESULT",
        "CONTRIBUTOR", "ORCID", "METHOD", "STATUS"
    );
    for c in &outcome.contributors {
        println!(
            "{:<14} {:<22} {:<8} {:<8} {}",
            c.contributor_id,
            c.orcid,
            c.method.as_str(),
            c.status,
            if c.success { "ok" } else { "failed" }
        );
    }
    Ok(())
}

async fn handle_credential_command(
    state: &Arc<AppState>,
    cmd: cli::CredentialCommands,
) -> anyhow::Result<()> {
    match cmd {
        cli::CredentialCommands::Show { contributor_id } => {
            let credential = state.credentials.get(contributor_id).await?;
            println!("Contributor:  {}", contributor_id);
            println!("State:        {:?}", AuthorizationState::of(&credential));
            println!(
                "Scope:        {}",
                credential.scope.map(|s| s.as_wire()).unwrap_or("-")
            );
            println!(
                "Expires:      {}",
                credential
                    .expires_at
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "-".into())
            );
            println!("Sandbox:      {}", credential.sandbox);
            println!(
                "Put-code:     {}",
                credential.work_put_code.as_deref().unwrap_or("-")
            );
        }
        cli::CredentialCommands::Clear { contributor_id } => {
            let mut credential = state.credentials.get(contributor_id).await?;
            if !credential.has_token() {
                println!("Contributor {} holds no token.", contributor_id);
                return Ok(());
            }
            state
                .credentials
                .clear(contributor_id, &mut credential, true)
                .await?;
            println!("Token of contributor {} cleared.", contributor_id);
        }
    }
    Ok(())
}

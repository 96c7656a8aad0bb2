//src/main.rs

use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod common;
mod config;
mod db;
mod docs;
mod handlers;
mod integrations;
mod middleware;
mod models;
mod services;

use crate::config::{AppState, Config};
use crate::docs::ApiDoc;
use crate::middleware::auth::auth_guard;

// Planilhas de importação podem passar do limite padrão do axum
const IMPORT_BODY_LIMIT: usize = 20 * 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .compact()
        .init();

    let config = Config::from_env()?;
    let app_state = AppState::new(config).await?;

    sqlx::migrate!().run(&app_state.db_pool).await?;
    tracing::info!("✅ Migrações do banco de dados executadas com sucesso!");

    if let (Some(email), Some(password)) = (&app_state.config.admin_email, &app_state.config.admin_password) {
        if let Err(e) = app_state.auth_service.ensure_admin(email, password).await {
            tracing::error!("Falha ao criar o admin inicial: {:?}", e);
        }
    }

    spawn_price_guard(app_state.clone());

    // Rotas públicas: checkout, pagamento e assinatura
    let auth_routes = Router::new().route("/login", post(handlers::auth::login));

    let checkout_routes = Router::new()
        .route("/start", post(handlers::checkout::start))
        .route("/advance", post(handlers::checkout::advance))
        .route("/back", post(handlers::checkout::back))
        .route("/submit", post(handlers::checkout::submit));

    let payment_routes = Router::new()
        .route("/confirm", post(handlers::payments::confirm))
        .route("/{invoice_id}/status", get(handlers::payments::payment_status));

    let public_routes = Router::new()
        .route("/contracts/{token}", get(handlers::contracts::view_contract))
        .route("/contracts/{token}/sign", post(handlers::contracts::sign_contract))
        .route("/verify/{hash}", get(handlers::contracts::verify_signature));

    // Rotas protegidas (o papel é checado em cada handler)
    let user_routes = Router::new()
        .route("/me", get(handlers::auth::get_me))
        .route("/me/password", put(handlers::auth::change_password));

    let admin_routes = Router::new()
        .route(
            "/team",
            get(handlers::auth::list_team).post(handlers::auth::create_staff),
        )
        // CRM
        .route(
            "/leads",
            post(handlers::crm::create_lead).get(handlers::crm::list_leads),
        )
        .route("/leads/{id}/status", put(handlers::crm::update_lead_status))
        .route("/clients", get(handlers::crm::list_clients))
        .route("/clients/{id}", get(handlers::crm::get_client))
        .route("/clients/{id}/assignment", put(handlers::crm::assign_client))
        .route(
            "/clients/{id}/activities",
            post(handlers::crm::add_activity).get(handlers::crm::list_activities),
        )
        .route("/clients/{id}/notifications", get(handlers::crm::list_notifications))
        // Contratos
        .route("/contracts", get(handlers::contracts::list_contracts))
        .route("/contracts/render", post(handlers::contracts::render_contract))
        .route("/contracts/expire-promotions", post(handlers::contracts::expire_promotions))
        .route("/contracts/{id}", get(handlers::contracts::get_contract))
        .route("/contracts/{id}/signature-link", post(handlers::contracts::issue_signature_link))
        // Processos
        .route("/processes", get(handlers::processes::list_processes))
        .route(
            "/processes/{id}",
            get(handlers::processes::get_process).put(handlers::processes::update_process),
        )
        .route("/processes/{id}/events", get(handlers::processes::list_events))
        .route("/rpi/ingest", post(handlers::processes::ingest_rpi))
        // Importação / exportação
        .route("/imports/preview", post(handlers::imports::preview_import))
        .route("/imports/clients", post(handlers::imports::import_clients))
        .route("/exports/clients", get(handlers::imports::export_clients))
        .route("/exports/processes", get(handlers::imports::export_processes))
        .layer(DefaultBodyLimit::max(IMPORT_BODY_LIMIT));

    let portal_routes = Router::new()
        .route("/", get(handlers::portal::overview))
        .route("/processes", get(handlers::portal::my_processes))
        .route("/contracts", get(handlers::portal::my_contracts))
        .route("/invoices", get(handlers::portal::my_invoices));

    let protected_routes = Router::new()
        .nest("/api/users", user_routes)
        .nest("/api/admin", admin_routes)
        .nest("/api/portal", portal_routes)
        .layer(axum_middleware::from_fn_with_state(app_state.clone(), auth_guard));

    // Combina tudo no router principal
    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/api/health", get(|| async { "OK" }))
        .nest("/api/auth", auth_routes)
        .nest("/api/checkout", checkout_routes)
        .nest("/api/payments", payment_routes)
        .route("/api/webhooks/asaas", post(handlers::payments::asaas_webhook))
        .nest("/api/public", public_routes)
        .merge(protected_routes)
        .with_state(app_state.clone());

    let listener = TcpListener::bind(&app_state.config.bind_addr).await?;
    tracing::info!("🚀 Servidor escutando em {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Tira do preço promocional os contratos à vista não assinados no prazo.
fn spawn_price_guard(app_state: AppState) {
    let period = Duration::from_secs(app_state.config.price_guard_interval_secs.max(60));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            if let Err(e) = app_state.contract_service.expire_promotions(chrono::Utc::now()).await {
                tracing::error!("Falha na verificação de preço promocional: {:?}", e);
            }
        }
    });
}

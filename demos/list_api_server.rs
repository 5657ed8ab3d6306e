use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{Next, from_fn_with_state};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use subseq_lists::api::{CurrentAccount, ListApp};
use subseq_lists::prelude::{AccountId, ListOperations, ListsConfig, PgStore, create_list_tables};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Clone)]
struct DevAuthConfig {
    default_account_id: AccountId,
    require_dev_header: bool,
}

#[derive(Clone)]
struct ExampleApp {
    store: Arc<PgStore>,
    operations: ListOperations<PgStore>,
    auth: DevAuthConfig,
}

impl ListApp for ExampleApp {
    type Store = PgStore;

    fn operations(&self) -> &ListOperations<PgStore> {
        &self.operations
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let database_url = env::var("DATABASE_URL")
        .context("DATABASE_URL is required to run demos/list_api_server.rs")?;
    let bind = env::var("LISTS_EXAMPLE_BIND").unwrap_or_else(|_| "127.0.0.1:4010".to_string());
    let bind_addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid LISTS_EXAMPLE_BIND '{}'", bind))?;

    let default_account_id = env::var("LISTS_EXAMPLE_DEFAULT_ACCOUNT_ID")
        .unwrap_or_else(|_| "00000000-0000-0000-0000-000000000001".to_string());
    let default_account_id = Uuid::parse_str(&default_account_id)
        .map(AccountId)
        .with_context(|| {
            format!(
                "invalid LISTS_EXAMPLE_DEFAULT_ACCOUNT_ID '{}'",
                default_account_id
            )
        })?;
    let auth = DevAuthConfig {
        default_account_id,
        require_dev_header: env_flag("LISTS_EXAMPLE_REQUIRE_DEV_HEADER"),
    };
    let config = ListsConfig::from_env().context("invalid list configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to postgres")?;
    create_list_tables(&pool)
        .await
        .context("failed to run list migrations")?;

    let store = Arc::new(PgStore::new(pool));
    let app_state = ExampleApp {
        operations: ListOperations::new(Arc::clone(&store), config),
        store,
        auth,
    };

    let api_v1 = Router::new()
        .route("/healthz", get(health_handler))
        .route("/example/whoami", get(whoami_handler))
        .merge(subseq_lists::api::routes::<ExampleApp>());

    let app = Router::new()
        .nest("/api/v1", api_v1)
        .layer(from_fn_with_state(
            app_state.clone(),
            dev_identity_middleware,
        ))
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind listener on {}", bind_addr))?;

    tracing::info!(%bind_addr, "subseq_lists example server listening");
    tracing::info!("api base path: /api/v1");
    tracing::info!("auth shim header: x-dev-account-id");
    tracing::info!("set LISTS_EXAMPLE_REQUIRE_DEV_HEADER=true to require x-dev-account-id");

    axum::serve(listener, app)
        .await
        .context("example server failed")
}

fn env_flag(name: &str) -> bool {
    match env::var(name) {
        Ok(value) => {
            let normalized = value.trim().to_ascii_lowercase();
            normalized == "1" || normalized == "true" || normalized == "yes"
        }
        Err(_) => false,
    }
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "ok": true
    }))
}

async fn whoami_handler(
    State(app): State<ExampleApp>,
    account: CurrentAccount,
) -> Response {
    match app.operations.current_owner(&account).await {
        Ok(owner) => Json(json!({
            "accountId": owner.account_id.to_string(),
            "ownerId": owner.id.to_string(),
        }))
        .into_response(),
        Err(err) => subseq_lists::api::AppError(err).into_response(),
    }
}

/// Stands in for real session auth: takes the account from `x-dev-account-id` and
/// provisions its owner profile on first sight.
async fn dev_identity_middleware(
    State(app): State<ExampleApp>,
    mut req: Request,
    next: Next,
) -> Response {
    let account_id = match parse_account_id(req.headers(), &app.auth) {
        Ok(account_id) => account_id,
        Err(response) => return response,
    };

    if let Err(err) = app.store.provision_owner(account_id).await {
        tracing::error!(account = %account_id, error = %err, "failed to provision owner");
        return json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "owner_provisioning_failed",
            "failed to provision owner",
        );
    }

    req.extensions_mut().insert(account_id);
    next.run(req).await
}

fn parse_account_id(headers: &HeaderMap, auth: &DevAuthConfig) -> Result<AccountId, Response> {
    let Some(raw_account_id) = header_value(headers, "x-dev-account-id") else {
        if auth.require_dev_header {
            return Err(json_error(
                StatusCode::UNAUTHORIZED,
                "missing_dev_account_id",
                "x-dev-account-id header is required",
            ));
        }
        return Ok(auth.default_account_id);
    };

    Uuid::parse_str(raw_account_id).map(AccountId).map_err(|_| {
        json_error(
            StatusCode::BAD_REQUEST,
            "invalid_dev_account_id",
            "invalid UUID",
        )
    })
}

fn header_value<'a>(headers: &'a HeaderMap, key: &str) -> Option<&'a str> {
    headers.get(key).and_then(|value| value.to_str().ok())
}

fn json_error(status: StatusCode, code: &'static str, message: &str) -> Response {
    (
        status,
        Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn auth(require_dev_header: bool) -> DevAuthConfig {
        DevAuthConfig {
            default_account_id: AccountId(Uuid::from_u128(1)),
            require_dev_header,
        }
    }

    #[test]
    fn missing_header_falls_back_to_default_account() {
        let account_id = parse_account_id(&HeaderMap::new(), &auth(false))
            .unwrap_or_else(|_| panic!("default account expected"));
        assert_eq!(account_id, AccountId(Uuid::from_u128(1)));
    }

    #[test]
    fn missing_header_is_rejected_when_required() {
        let response = parse_account_id(&HeaderMap::new(), &auth(true))
            .expect_err("header is required");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn header_account_wins_and_bad_uuid_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-dev-account-id",
            HeaderValue::from_static("00000000-0000-0000-0000-000000000007"),
        );
        let account_id = parse_account_id(&headers, &auth(true))
            .unwrap_or_else(|_| panic!("header account expected"));
        assert_eq!(account_id, AccountId(Uuid::from_u128(7)));

        headers.insert("x-dev-account-id", HeaderValue::from_static("not-a-uuid"));
        let response = parse_account_id(&headers, &auth(false)).expect_err("invalid uuid");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

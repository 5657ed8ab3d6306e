use std::convert::Infallible;

use axum::{
    Json, Router,
    extract::{FromRequestParts, Path, Query, State},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, put},
};
use serde_json::json;

use crate::directory::IdentityProvider;
use crate::error::{ErrorKind, LibError};
use crate::models::{
    AccountId, CreateListPayload, CreateVideoPayload, ListId, ListListsQuery, ListVideosQuery,
    UpdateListPayload, UpdateVideoPayload, VideoId,
};
use crate::operations::ListOperations;
use crate::store::GraphStore;

#[derive(Debug)]
pub struct AppError(pub LibError);

impl From<LibError> for AppError {
    fn from(value: LibError) -> Self {
        Self(value)
    }
}

pub const fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Database => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::NotAuthenticated => StatusCode::UNAUTHORIZED,
        ErrorKind::OwnerNotFound => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::QuotaExceeded => StatusCode::CONFLICT,
        ErrorKind::InvalidSlug => StatusCode::BAD_REQUEST,
        ErrorKind::EmptyCollection => StatusCode::BAD_REQUEST,
        ErrorKind::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = status_for(self.0.kind);

        tracing::error!(kind = ?self.0.kind, code = self.0.code, error = %self.0.source, "list api request failed");
        (
            status,
            Json(json!({
                "error": {
                    "code": self.0.code,
                    "message": self.0.public
                }
            })),
        )
            .into_response()
    }
}

/// The authenticated account for a request, placed in the request extensions by the
/// host application's auth middleware.
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentAccount(pub Option<AccountId>);

impl IdentityProvider for CurrentAccount {
    fn current_account_id(&self) -> Option<AccountId> {
        self.0
    }
}

impl<S> FromRequestParts<S> for CurrentAccount
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(parts.extensions.get::<AccountId>().copied()))
    }
}

pub trait ListApp: Clone + Send + Sync + 'static {
    type Store: GraphStore;

    fn operations(&self) -> &ListOperations<Self::Store>;
}

async fn create_list_handler<A: ListApp>(
    State(app): State<A>,
    account: CurrentAccount,
    Json(payload): Json<CreateListPayload>,
) -> Result<impl IntoResponse, AppError> {
    let ops = app.operations();
    let owner = ops.current_owner(&account).await?;
    let list = ops.create_list(&owner, payload).await?;
    Ok((StatusCode::CREATED, Json(list)))
}

async fn list_lists_handler<A: ListApp>(
    State(app): State<A>,
    account: CurrentAccount,
    Query(query): Query<ListListsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let ops = app.operations();
    let lists = if query.current_user_only()? {
        let owner = ops.current_owner(&account).await?;
        ops.lists_for_owner(&owner, query.eager()).await?
    } else {
        ops.list_all(query.eager()).await?
    };
    Ok(Json(lists))
}

async fn get_list_handler<A: ListApp>(
    State(app): State<A>,
    Path(list_id): Path<ListId>,
) -> Result<impl IntoResponse, AppError> {
    let list = app.operations().get_list(list_id).await?;
    Ok(Json(list))
}

async fn update_list_handler<A: ListApp>(
    State(app): State<A>,
    account: CurrentAccount,
    Path(list_id): Path<ListId>,
    Json(payload): Json<UpdateListPayload>,
) -> Result<impl IntoResponse, AppError> {
    let ops = app.operations();
    let owner = ops.current_owner(&account).await?;
    let list = ops.update_list(&owner, list_id, payload).await?;
    Ok(Json(list))
}

async fn delete_list_handler<A: ListApp>(
    State(app): State<A>,
    account: CurrentAccount,
    Path(list_id): Path<ListId>,
) -> Result<impl IntoResponse, AppError> {
    let ops = app.operations();
    let owner = ops.current_owner(&account).await?;
    ops.delete_list(&owner, list_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_by_slug_handler<A: ListApp>(
    State(app): State<A>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let list = app.operations().resolve_by_slug(&slug).await?;
    Ok(Json(list))
}

async fn attach_video_handler<A: ListApp>(
    State(app): State<A>,
    account: CurrentAccount,
    Path((list_id, video_id)): Path<(ListId, VideoId)>,
) -> Result<impl IntoResponse, AppError> {
    let ops = app.operations();
    let owner = ops.current_owner(&account).await?;
    ops.attach_video(&owner, list_id, video_id).await?;
    Ok(Json(ops.get_list(list_id).await?))
}

async fn detach_video_handler<A: ListApp>(
    State(app): State<A>,
    account: CurrentAccount,
    Path((list_id, video_id)): Path<(ListId, VideoId)>,
) -> Result<impl IntoResponse, AppError> {
    let ops = app.operations();
    let owner = ops.current_owner(&account).await?;
    ops.detach_video(&owner, list_id, video_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_video_handler<A: ListApp>(
    State(app): State<A>,
    account: CurrentAccount,
    Json(payload): Json<CreateVideoPayload>,
) -> Result<impl IntoResponse, AppError> {
    let ops = app.operations();
    let owner = ops.current_owner(&account).await?;
    let video = ops.create_video(&owner, payload).await?;
    Ok((StatusCode::CREATED, Json(video)))
}

async fn list_videos_handler<A: ListApp>(
    State(app): State<A>,
    account: CurrentAccount,
    Query(query): Query<ListVideosQuery>,
) -> Result<impl IntoResponse, AppError> {
    let ops = app.operations();
    let videos = if query.current_user_only()? {
        let owner = ops.current_owner(&account).await?;
        ops.videos_for_owner(&owner).await?
    } else {
        ops.list_videos().await?
    };
    Ok(Json(videos))
}

async fn get_video_handler<A: ListApp>(
    State(app): State<A>,
    Path(video_id): Path<VideoId>,
) -> Result<impl IntoResponse, AppError> {
    let video = app.operations().get_video(video_id).await?;
    Ok(Json(video))
}

async fn update_video_handler<A: ListApp>(
    State(app): State<A>,
    account: CurrentAccount,
    Path(video_id): Path<VideoId>,
    Json(payload): Json<UpdateVideoPayload>,
) -> Result<impl IntoResponse, AppError> {
    let ops = app.operations();
    let owner = ops.current_owner(&account).await?;
    let video = ops.update_video(&owner, video_id, payload).await?;
    Ok(Json(video))
}

async fn delete_video_handler<A: ListApp>(
    State(app): State<A>,
    account: CurrentAccount,
    Path(video_id): Path<VideoId>,
) -> Result<impl IntoResponse, AppError> {
    let ops = app.operations();
    let owner = ops.current_owner(&account).await?;
    ops.delete_video(&owner, video_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn routes<A: ListApp>() -> Router<A> {
    tracing::info!("Registering route /video-lists [GET,POST]");
    tracing::info!("Registering route /video-lists/{{list_id}} [GET,PUT,DELETE]");
    tracing::info!("Registering route /video-lists/by-slug/{{slug}} [GET]");
    tracing::info!("Registering route /video-lists/{{list_id}}/videos/{{video_id}} [PUT,DELETE]");
    tracing::info!("Registering route /videos [GET,POST]");
    tracing::info!("Registering route /videos/{{video_id}} [GET,PUT,DELETE]");

    Router::new()
        .route(
            "/video-lists",
            get(list_lists_handler::<A>).post(create_list_handler::<A>),
        )
        .route(
            "/video-lists/{list_id}",
            get(get_list_handler::<A>)
                .put(update_list_handler::<A>)
                .delete(delete_list_handler::<A>),
        )
        .route(
            "/video-lists/by-slug/{slug}",
            get(list_by_slug_handler::<A>),
        )
        .route(
            "/video-lists/{list_id}/videos/{video_id}",
            put(attach_video_handler::<A>).delete(detach_video_handler::<A>),
        )
        .route(
            "/videos",
            get(list_videos_handler::<A>).post(create_video_handler::<A>),
        )
        .route(
            "/videos/{video_id}",
            get(get_video_handler::<A>)
                .put(update_video_handler::<A>)
                .delete(delete_video_handler::<A>),
        )
}

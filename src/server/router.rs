use axum::{
    Router,
    routing::{delete, get, post, put},
};
use tower_http::trace::TraceLayer;

use crate::db::Storage;
use crate::server::handlers::{credentials, directory, health, users};
use crate::service::{CredentialService, DirectoryService, UserService};

#[derive(Clone)]
pub struct AppState {
    pub credentials: CredentialService,
    pub users: UserService,
    pub directory: DirectoryService,
}

impl AppState {
    pub fn new(storage: Storage) -> Self {
        Self {
            credentials: CredentialService::new(storage.clone()),
            users: UserService::new(storage.clone()),
            directory: DirectoryService::new(storage),
        }
    }
}

fn credential_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(credentials::index).post(credentials::store))
        .route(
            "/{id}",
            get(credentials::show)
                .put(credentials::update)
                .delete(credentials::destroy),
        )
        .route("/{id}/restore", post(credentials::restore))
        .route("/{id}/force", delete(credentials::force_destroy))
        .route("/{id}/activity", get(credentials::activity))
}

fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(users::index).post(users::store))
        .route(
            "/{id}",
            get(users::show).put(users::update).delete(users::destroy),
        )
        .route("/{id}/restore", post(users::restore))
        .route("/{id}/force", delete(users::force_destroy))
        .route("/{id}/token", post(users::rotate_token))
        .route("/{id}/roles", put(users::sync_roles))
        .route("/{id}/notifications", get(users::notifications))
}

pub fn app_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/me", get(users::me))
        .nest("/users", user_routes())
        .nest("/credentials", credential_routes())
        .route("/ranks", get(directory::ranks).post(directory::store_rank))
        .route(
            "/offices",
            get(directory::offices).post(directory::store_office),
        )
        .route("/activity", get(credentials::all_activity));

    Router::new()
        .route("/health", get(health::health))
        .nest("/api", api)
        // older clients address credentials without the /api prefix
        .route(
            "/credentials",
            get(credentials::index).post(credentials::store),
        )
        .route(
            "/credentials/{id}",
            get(credentials::show)
                .put(credentials::update)
                .delete(credentials::destroy),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

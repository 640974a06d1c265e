mod history;
mod pages;
mod upload;

use crate::{config::ServeMode, ctx::Ctx};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

pub fn get_routes(ctx: Ctx) -> Router {
    let mut router: Router<Ctx> = Router::new()
        .route("/upload-image", post(upload::upload_image))
        .route("/upload-images", post(upload::upload_images))
        .route("/history", get(history::history))
        .route("/version", get(|| async { env!("CARGO_PKG_VERSION") }));

    if ctx.settings.server.mode == ServeMode::Ui {
        router = router.route("/", get(history::index));
    }

    router
        .layer(DefaultBodyLimit::max(ctx.settings.server.max_upload_bytes))
        .with_state(ctx)
}

use super::pages;
use crate::{
    config::ServeMode,
    ctx::Ctx,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::State,
    response::{Html, IntoResponse, Response},
    Json,
};

pub async fn history(State(ctx): State<Ctx>) -> ApiResult<Response> {
    let records = ctx.history.list_all().await.map_err(|e| {
        tracing::error!("failed to list history: {:?}", e);
        ApiError::History
    })?;

    let response = match ctx.settings.server.mode {
        ServeMode::Api => Json(records).into_response(),
        ServeMode::Ui => Html(pages::history_page(&records)).into_response(),
    };
    Ok(response)
}

pub async fn index(State(ctx): State<Ctx>) -> Html<String> {
    Html(pages::index_page(
        &ctx.registry.names(),
        &ctx.settings.models.default_model,
    ))
}

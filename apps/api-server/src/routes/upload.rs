use crate::{
    ctx::Ctx,
    error::{ApiError, ApiResult},
    pipeline::{clamp_length, generate_caption, CaptionError},
};
use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Multipart, Query, State},
    Json,
};
use history_db::HistoryError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Deserialize, Debug, Default)]
pub struct UploadParams {
    pub model_name: Option<String>,
    pub length: Option<i64>,
}

#[derive(Serialize, Debug)]
pub struct DescriptionResponse {
    pub description: String,
}

#[derive(Serialize, Debug)]
pub struct DescriptionsResponse {
    pub descriptions: Vec<String>,
}

#[derive(Debug, Error)]
enum DescribeError {
    #[error(transparent)]
    Caption(#[from] CaptionError),
    #[error("failed to save caption: {0}")]
    History(#[from] HistoryError),
}

/// Resolve query defaults and check the model exists, before any of the
/// body is read.
fn resolve_params(ctx: &Ctx, params: UploadParams) -> ApiResult<(String, usize)> {
    let models = &ctx.settings.models;
    let model_name = params
        .model_name
        .unwrap_or_else(|| models.default_model.clone());

    if !ctx.registry.contains(&model_name) {
        tracing::warn!("rejected upload for unknown model {}", model_name);
        return Err(ApiError::ModelNotFound);
    }

    let length = clamp_length(
        params.length.unwrap_or(models.default_length),
        models.max_length,
    );

    Ok((model_name, length))
}

/// Caption one upload and persist the result.
async fn describe_image(
    ctx: &Ctx,
    data: Bytes,
    model_name: &str,
    max_length: usize,
) -> Result<String, DescribeError> {
    let description = generate_caption(&ctx.registry, data, model_name, max_length).await?;
    ctx.history.save(&description).await?;
    Ok(description)
}

pub async fn upload_image(
    State(ctx): State<Ctx>,
    params: Result<Query<UploadParams>, QueryRejection>,
    mut multipart: Multipart,
) -> ApiResult<Json<DescriptionResponse>> {
    let Query(params) = params?;
    let (model_name, max_length) = resolve_params(&ctx, params)?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or_default().to_string();
            upload = Some((filename, field.bytes().await?));
            break;
        }
    }
    let (filename, data) = upload.ok_or(ApiError::MissingFile)?;

    tracing::info!(
        "captioning {} ({} bytes) with {}",
        filename,
        data.len(),
        model_name
    );

    match describe_image(&ctx, data, &model_name, max_length).await {
        Ok(description) => Ok(Json(DescriptionResponse { description })),
        Err(DescribeError::Caption(CaptionError::ModelNotFound(_))) => {
            Err(ApiError::ModelNotFound)
        }
        Err(e) => {
            tracing::error!("failed to process image {}: {:?}", filename, e);
            Err(ApiError::Processing)
        }
    }
}

/// Files are captioned one by one in submission order. The first failure
/// aborts the batch; captions saved for earlier files are kept.
pub async fn upload_images(
    State(ctx): State<Ctx>,
    params: Result<Query<UploadParams>, QueryRejection>,
    mut multipart: Multipart,
) -> ApiResult<Json<DescriptionsResponse>> {
    let Query(params) = params?;
    let (model_name, max_length) = resolve_params(&ctx, params)?;

    let mut descriptions = vec![];
    while let Some(field) = multipart.next_field().await? {
        if !matches!(field.name(), Some("files") | Some("file")) {
            continue;
        }

        let filename = match field.file_name() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("#{}", descriptions.len() + 1),
        };
        let data = field.bytes().await?;

        match describe_image(&ctx, data, &model_name, max_length).await {
            Ok(description) => descriptions.push(description),
            Err(DescribeError::Caption(CaptionError::ModelNotFound(_))) => {
                return Err(ApiError::ModelNotFound);
            }
            Err(e) => {
                tracing::error!(
                    "failed to process image {} ({} done): {:?}",
                    filename,
                    descriptions.len(),
                    e
                );
                return Err(ApiError::BatchItem(filename));
            }
        }
    }

    if descriptions.is_empty() {
        return Err(ApiError::MissingFile);
    }

    tracing::info!("captioned {} images with {}", descriptions.len(), model_name);
    Ok(Json(DescriptionsResponse { descriptions }))
}

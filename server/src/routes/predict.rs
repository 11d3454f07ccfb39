//! Prediction endpoint

use axum::{
    extract::{Multipart, State},
    Json,
};
use tracing::info;

use theraphosid::inference::PredictionResult;

use super::ApiError;
use crate::state::SharedState;

const ACCEPTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

fn has_accepted_extension(file_name: &str) -> bool {
    file_name
        .rsplit('.')
        .next()
        .map(|ext| ACCEPTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// POST /predict - Classify one uploaded image
///
/// Expects a multipart form with a single `image` field holding a
/// jpg/jpeg/png file. Inference runs on a blocking thread so the async
/// runtime stays responsive.
pub async fn predict(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<PredictionResult>, ApiError> {
    let mut image_bytes: Option<Vec<u8>> = None;
    let mut file_name = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid multipart body: {}", e)))?
    {
        if field.name() != Some("image") {
            continue;
        }

        file_name = field.file_name().unwrap_or("upload").to_string();
        if !has_accepted_extension(&file_name) {
            return Err(ApiError::bad_request(format!(
                "unsupported file type '{}': expected jpg, jpeg, or png",
                file_name
            )));
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("failed to read upload: {}", e)))?;
        image_bytes = Some(bytes.to_vec());
        break;
    }

    let bytes = image_bytes
        .ok_or_else(|| ApiError::bad_request("missing 'image' field in multipart form"))?;
    if bytes.is_empty() {
        return Err(ApiError::bad_request("uploaded image is empty"));
    }
    if bytes.len() > state.config.max_upload_bytes {
        return Err(ApiError::bad_request(format!(
            "upload exceeds the {} byte limit",
            state.config.max_upload_bytes
        )));
    }

    let state_for_task = state.clone();
    let result = tokio::task::spawn_blocking(move || {
        state_for_task.predictor.predict_bytes(&bytes)
    })
    .await
    .map_err(|e| ApiError::internal(format!("inference task failed: {}", e)))??;

    info!(
        "Predicted '{}' ({:.1}%) for upload '{}' in {:.1} ms",
        result.species,
        result.confidence * 100.0,
        file_name,
        result.inference_time_ms
    );

    Ok(Json(result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepted_extensions() {
        assert!(has_accepted_extension("spider.jpg"));
        assert!(has_accepted_extension("spider.JPEG"));
        assert!(has_accepted_extension("spider.png"));
        assert!(!has_accepted_extension("spider.gif"));
        assert!(!has_accepted_extension("spider"));
    }
}

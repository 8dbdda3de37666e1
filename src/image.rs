//! Cartoon generation through an external image service.

use std::path::Path;

use serde::Deserialize;
use serde_json::json;
use tokio::time::{timeout, Duration};
use tracing::info;
use uuid::Uuid;

use crate::artifact::GeneratedImage;
use crate::config::ImageConfig;
use crate::error::PipelineError;
use crate::TARGET_WEB_REQUEST;

// Diffusion endpoints routinely take a minute under load.
const GENERATE_TIMEOUT: Duration = Duration::from_secs(120);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct FluxResponse {
    images: Vec<FluxImage>,
}

#[derive(Debug, Deserialize)]
struct FluxImage {
    url: String,
}

/// Submits the image prompt and stores the result under a run-unique
/// filename. `cycle` distinguishes regeneration rounds within one run.
pub async fn generate_image(
    cfg: &ImageConfig,
    image_prompt: &str,
    drafts_dir: &Path,
    run_id: Uuid,
    cycle: u32,
) -> Result<GeneratedImage, PipelineError> {
    let client = reqwest::Client::new();

    let request = client
        .post(&cfg.endpoint)
        .header("Authorization", format!("Key {}", cfg.api_key))
        .json(&json!({
            "prompt": image_prompt,
            "image_size": "square_hd",
        }))
        .send();

    let response = timeout(GENERATE_TIMEOUT, request)
        .await
        .map_err(|_| PipelineError::external("image", "generation timed out"))?
        .map_err(|e| PipelineError::external("image", e))?;

    if !response.status().is_success() {
        return Err(PipelineError::ExternalService {
            service: "image",
            message: format!("status {}", response.status()),
        });
    }

    let body: FluxResponse = response
        .json()
        .await
        .map_err(|e| PipelineError::external("image", e))?;
    let image_url = body
        .images
        .first()
        .map(|image| image.url.clone())
        .ok_or_else(|| PipelineError::external("image", "response contained no images"))?;

    let download = timeout(DOWNLOAD_TIMEOUT, async {
        client.get(&image_url).send().await?.error_for_status()?.bytes().await
    })
    .await
    .map_err(|_| PipelineError::external("image", "download timed out"))?
    .map_err(|e| PipelineError::external("image", e))?;

    tokio::fs::create_dir_all(drafts_dir)
        .await
        .map_err(|e| PipelineError::external("image", e))?;
    let local_path = drafts_dir.join(format!("cartoon_{}_{}.jpg", run_id.simple(), cycle));
    tokio::fs::write(&local_path, &download)
        .await
        .map_err(|e| PipelineError::external("image", e))?;

    info!(target: TARGET_WEB_REQUEST, "Image saved: {}", local_path.display());
    Ok(GeneratedImage {
        local_path,
        source_image_prompt: image_prompt.to_string(),
    })
}

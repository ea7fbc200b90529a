use actix_multipart::form::{MultipartForm, bytes::Bytes, text::Text};
use actix_web::{HttpResponse, http::header::CACHE_CONTROL, web};
use base64::Engine;
use mockup_composer::{
    BlendMode, DEFAULT_PRODUCT_TYPE, DisplacementConfig, LegacyCompositor, MockupCompositor,
    MockupError, MockupRequest, OutputFormat, OutputQuality, Scene, SceneRenderer, render_preview,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ApiError;

const IMMUTABLE: &str = "public, max-age=31536000, immutable";
const NO_CACHE: &str = "no-cache, no-store, must-revalidate";

#[derive(MultipartForm)]
pub struct GenerateMockupForm {
    design: Bytes,
    #[multipart(rename = "templateId")]
    template_id: Text<String>,
    brightness: Option<Text<f32>>,
    contrast: Option<Text<f32>>,
    saturation: Option<Text<f32>>,
    #[multipart(rename = "blendMode")]
    blend_mode: Option<Text<String>>,
    #[multipart(rename = "textureOverlay")]
    texture_overlay: Option<Text<bool>>,
    #[multipart(rename = "textureOpacity")]
    texture_opacity: Option<Text<f32>>,
    format: Option<Text<String>>,
    quality: Option<Text<u8>>,
}

impl GenerateMockupForm {
    fn into_request(self) -> Result<MockupRequest, MockupError> {
        let defaults = DisplacementConfig::default();
        let config = DisplacementConfig {
            brightness: self.brightness.map_or(defaults.brightness, Text::into_inner),
            contrast: self.contrast.map_or(defaults.contrast, Text::into_inner),
            saturation: self.saturation.map_or(defaults.saturation, Text::into_inner),
            blend_mode: match self.blend_mode {
                Some(mode) => mode.parse::<BlendMode>()?,
                None => defaults.blend_mode,
            },
            texture_overlay: self
                .texture_overlay
                .map_or(defaults.texture_overlay, Text::into_inner),
            texture_opacity: self
                .texture_opacity
                .map_or(defaults.texture_opacity, Text::into_inner),
        };
        config.validate()?;

        let format = match self.format {
            Some(format) => format.parse::<OutputFormat>()?,
            None => OutputFormat::default(),
        };
        let quality = match self.quality {
            Some(quality) => OutputQuality::new(quality.into_inner())?,
            None => OutputQuality::default(),
        };

        if self.design.data.is_empty() {
            return Err(MockupError::validation("design file is empty"));
        }

        Ok(MockupRequest {
            template_id: self.template_id.into_inner(),
            design: self.design.data.to_vec(),
            config,
            format,
            quality,
        })
    }
}

#[tracing::instrument(skip(form, compositor))]
pub async fn generate_mockup(
    MultipartForm(form): MultipartForm<GenerateMockupForm>,
    compositor: web::Data<MockupCompositor>,
) -> Result<HttpResponse, ApiError> {
    let request = form.into_request()?;

    let result = web::block(move || compositor.generate(&request))
        .await?
        .map_err(MockupError::from)?;

    Ok(HttpResponse::Ok()
        .content_type(result.format.content_type())
        .insert_header((
            "X-Generation-Time",
            format!("{}ms", result.elapsed.as_millis()),
        ))
        .insert_header((CACHE_CONTROL, IMMUTABLE))
        .body(result.bytes))
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LegacyMockupBody {
    artwork_data_url: String,
    #[serde(default)]
    product_type: Option<String>,
}

#[tracing::instrument(skip(body, legacy), fields(product_type = ?body.product_type))]
pub async fn generate_legacy_mockup(
    body: web::Json<LegacyMockupBody>,
    legacy: web::Data<LegacyCompositor>,
) -> Result<HttpResponse, ApiError> {
    let LegacyMockupBody {
        artwork_data_url,
        product_type,
    } = body.into_inner();
    let product_type = product_type.unwrap_or_else(|| DEFAULT_PRODUCT_TYPE.to_string());

    let bytes = web::block(move || legacy.generate_legacy(&artwork_data_url, &product_type))
        .await?
        .map_err(MockupError::from)?;

    Ok(HttpResponse::Ok()
        .content_type(OutputFormat::Png.content_type())
        .body(bytes))
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MockupActionQuery {
    action: Option<String>,
    #[serde(default)]
    reload: bool,
    template_id: Option<String>,
}

#[tracing::instrument(skip(compositor))]
pub async fn mockup_action(
    query: web::Query<MockupActionQuery>,
    compositor: web::Data<MockupCompositor>,
) -> Result<HttpResponse, ApiError> {
    let MockupActionQuery {
        action,
        reload,
        template_id,
    } = query.into_inner();
    let library = compositor.library().clone();

    match action.as_deref() {
        Some("templates") => {
            let summary = web::block(move || library.load_library(reload))
                .await?
                .map_err(MockupError::from)?
                .summary();
            Ok(HttpResponse::Ok().json(summary))
        }
        Some("stats") => {
            let stats = web::block(move || library.stats())
                .await?
                .map_err(MockupError::from)?;
            Ok(HttpResponse::Ok().json(stats))
        }
        Some("clear-cache") => {
            library.clear_cache();
            Ok(HttpResponse::Ok().json(json!({
                "success": true,
                "message": "Template cache cleared",
            })))
        }
        Some("preview") => {
            let id = template_id
                .filter(|id| !id.is_empty())
                .ok_or_else(|| ApiError::validation("templateId is required for preview"))?;
            let bytes = web::block(move || -> Result<Vec<u8>, MockupError> {
                let template = library.get_template(&id)?;
                Ok(render_preview(&template)?)
            })
            .await??;
            Ok(HttpResponse::Ok()
                .content_type(OutputFormat::Png.content_type())
                .insert_header((CACHE_CONTROL, NO_CACHE))
                .body(bytes))
        }
        Some(other) => Err(ApiError::validation(format!("unknown action '{other}'"))),
        None => Err(ApiError::validation("missing action parameter")),
    }
}

#[derive(MultipartForm)]
pub struct SceneMockupsForm {
    design: Bytes,
    /// JSON array of scenes.
    scenes: Text<String>,
}

#[derive(Serialize)]
struct SceneMockupBody {
    index: usize,
    name: Option<String>,
    image: String,
}

#[tracing::instrument(skip(form, renderer))]
pub async fn scene_mockups(
    MultipartForm(form): MultipartForm<SceneMockupsForm>,
    renderer: web::Data<SceneRenderer>,
) -> Result<HttpResponse, ApiError> {
    let scenes: Vec<Scene> = serde_json::from_str(&form.scenes)
        .map_err(|err| ApiError::validation(format!("scenes is not a valid scene list: {err}")))?;
    let design = form.design.data.to_vec();

    let outcome = web::block(move || renderer.render_batch(&scenes, &design))
        .await?
        .map_err(MockupError::from)?;

    let mockups: Vec<SceneMockupBody> = outcome
        .mockups
        .into_iter()
        .map(|mockup| SceneMockupBody {
            index: mockup.index,
            name: mockup.name,
            image: format!(
                "data:{};base64,{}",
                OutputFormat::Jpeg.content_type(),
                base64::engine::general_purpose::STANDARD.encode(&mockup.bytes)
            ),
        })
        .collect();

    Ok(HttpResponse::Ok().json(json!({
        "success": outcome.success,
        "mockups": mockups,
    })))
}

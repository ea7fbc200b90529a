use std::{net::TcpListener, sync::Arc};

use actix_multipart::form::MultipartFormConfig;
use actix_web::{
    App, HttpServer,
    dev::Server,
    middleware::{NormalizePath, TrailingSlash},
    web::{self, ServiceConfig},
};
use mockup_composer::{
    LegacyCompositor, LibraryCache, MockupCompositor, SceneRenderer, source_for_path,
};
use tracing_actix_web::TracingLogger;

use crate::{config::AppConfig, error::ApiError, scope::mockup::mockup_scope};

/// Everything the handlers share, cheap to clone per worker.
#[derive(Clone)]
pub struct AppState {
    pub compositor: web::Data<MockupCompositor>,
    pub legacy: web::Data<LegacyCompositor>,
    pub scenes: web::Data<SceneRenderer>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(
        library: LibraryCache,
        legacy: LegacyCompositor,
        scenes: SceneRenderer,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            compositor: web::Data::new(MockupCompositor::new(Arc::new(library))),
            legacy: web::Data::new(legacy),
            scenes: web::Data::new(scenes),
            max_upload_bytes,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        tracing::info!(
            templates = %config.templates.source.display(),
            legacy_assets = %config.legacy.assets.display(),
            "Configuring mockup sources"
        );
        Self::new(
            LibraryCache::from_boxed(source_for_path(&config.templates.source)),
            LegacyCompositor::from_boxed(source_for_path(&config.legacy.assets)),
            SceneRenderer::from_mode(config.perspective.mode),
            config.servlet.max_upload_bytes,
        )
    }
}

/// Register routes, shared state and extractor limits.
pub fn configure_app(config: &mut ServiceConfig, state: &AppState) {
    let limit = state.max_upload_bytes;
    config
        .app_data(state.compositor.clone())
        .app_data(state.legacy.clone())
        .app_data(state.scenes.clone())
        .app_data(
            MultipartFormConfig::default()
                .total_limit(limit)
                .memory_limit(limit)
                .error_handler(|err, _req| ApiError::validation(err.to_string()).into()),
        )
        .app_data(
            web::JsonConfig::default()
                .limit(limit)
                .error_handler(|err, _req| ApiError::validation(err.to_string()).into()),
        )
        .app_data(
            web::QueryConfig::default()
                .error_handler(|err, _req| ApiError::validation(err.to_string()).into()),
        )
        .service(mockup_scope());
}

pub fn create_server(listener: TcpListener, config: AppConfig) -> anyhow::Result<Server> {
    let state = AppState::from_config(&config);

    let server = HttpServer::new(move || {
        let state = state.clone();
        App::new()
            .wrap(TracingLogger::default())
            .wrap(NormalizePath::new(TrailingSlash::MergeOnly))
            .configure(move |cfg| configure_app(cfg, &state))
    });

    Ok(server.listen(listener)?.run())
}

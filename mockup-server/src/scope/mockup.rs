use actix_web::{Scope, guard, http::header::CONTENT_TYPE, web};

use crate::handler::mockup::{
    generate_legacy_mockup, generate_mockup, mockup_action, scene_mockups,
};

fn is_multipart(ctx: &guard::GuardContext<'_>) -> bool {
    ctx.head()
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"))
}

pub fn mockup_scope() -> Scope {
    web::scope("")
        .service(
            web::resource("/generate-mockup")
                .route(web::post().guard(guard::fn_guard(is_multipart)).to(generate_mockup))
                // anything else posted here is the JSON body of old clients
                .route(web::post().to(generate_legacy_mockup))
                .route(web::get().to(mockup_action)),
        )
        .route("/scene-mockups", web::post().to(scene_mockups))
}

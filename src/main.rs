// src/main.rs
use actix_web::{App, HttpResponse, HttpServer, middleware, web};
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

mod editor;
mod errors;
mod handlers;
mod models;
mod services;

use crate::handlers::{
    add_image_from_url, apply_suggestion, clear_canvas, create_session, download_snapshot,
    edit_result, enhance, get_session, list_sessions, patch_transform, pexels_search,
    pointer_event, remove_layer, reorder_layer, reset_transform, upload_images,
};
use crate::services::{
    Compositor, JudgeService, Orchestrator, PexelsClient, ReplicateClient, SessionStore,
};

#[derive(Clone)]
pub struct AppState {
    sessions: Arc<SessionStore>,
    compositor: Arc<Compositor>,
    orchestrator: Arc<Orchestrator>,
    judge: Arc<JudgeService>,
    pexels: Arc<PexelsClient>,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    info!("Starting Montage service...");

    let replicate_token =
        std::env::var("REPLICATE_API_TOKEN").expect("REPLICATE_API_TOKEN must be set");
    let openai_key = std::env::var("OPENAI_API_KEY").expect("OPENAI_API_KEY must be set");
    let pexels_key = std::env::var("PEXELS_API_KEY").ok();
    let static_root =
        PathBuf::from(std::env::var("STATIC_DIR").unwrap_or_else(|_| "./static".to_string()));

    let judge = Arc::new(JudgeService::new(openai_key));
    let app_state = AppState {
        sessions: Arc::new(SessionStore::new()),
        compositor: Arc::new(Compositor::new()),
        orchestrator: Arc::new(Orchestrator::new(
            Arc::new(ReplicateClient::new(replicate_token)),
            judge.clone(),
            static_root.clone(),
        )),
        judge,
        pexels: Arc::new(PexelsClient::new(pexels_key)),
    };

    info!("Starting HTTP server on 0.0.0.0:8080");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(middleware::Logger::default())
            .service(
                web::scope("/api/v1")
                    .route("/sessions", web::post().to(create_session))
                    .route("/sessions", web::get().to(list_sessions))
                    .route("/sessions/{session_id}", web::get().to(get_session))
                    .route(
                        "/sessions/{session_id}/images",
                        web::post().to(upload_images),
                    )
                    .route(
                        "/sessions/{session_id}/images/url",
                        web::post().to(add_image_from_url),
                    )
                    .route(
                        "/sessions/{session_id}/pointer",
                        web::post().to(pointer_event),
                    )
                    .route(
                        "/sessions/{session_id}/layers/{layer_id}/order",
                        web::post().to(reorder_layer),
                    )
                    .route(
                        "/sessions/{session_id}/layers/{layer_id}",
                        web::patch().to(patch_transform),
                    )
                    .route(
                        "/sessions/{session_id}/layers/{layer_id}/reset",
                        web::post().to(reset_transform),
                    )
                    .route(
                        "/sessions/{session_id}/layers/{layer_id}",
                        web::delete().to(remove_layer),
                    )
                    .route("/sessions/{session_id}/clear", web::post().to(clear_canvas))
                    .route(
                        "/sessions/{session_id}/snapshot",
                        web::get().to(download_snapshot),
                    )
                    .route("/sessions/{session_id}/enhance", web::post().to(enhance))
                    .route("/sessions/{session_id}/edit", web::post().to(edit_result))
                    .route(
                        "/sessions/{session_id}/suggestions/{index}",
                        web::post().to(apply_suggestion),
                    )
                    .route("/pexels", web::get().to(pexels_search)),
            )
            .service(actix_files::Files::new("/static", static_root.clone()))
            .route("/health", web::get().to(health_check))
    })
    .bind("0.0.0.0:8080")?
    .run()
    .await
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "montage",
        "version": "0.1.0"
    }))
}

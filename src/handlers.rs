// src/handlers.rs
use actix_multipart::Multipart;
use actix_web::{HttpResponse, web};
use futures_util::TryStreamExt;
use log::{error, info};
use rand::Rng;
use uuid::Uuid;

use crate::AppState;
use crate::editor::{CANVAS_HEIGHT, CANVAS_WIDTH};
use crate::errors::MontageError;
use crate::models::*;
use crate::services::Compositor;
use crate::services::orchestrator::{DEFAULT_ENHANCEMENT_PROMPT, suggestion_prompt};
use crate::services::session::Session;

fn canvas_state(session: &Session) -> serde_json::Value {
    serde_json::json!({
        "id": session.id,
        "layers": session.editor.layers(),
        "selected": session.editor.selected(),
        "context_menu": session.editor.context_menu(),
        "enhanced_result": session.enhanced_result,
        "suggestions": session.suggestions,
        "comparison": session.comparison,
        "created_at": session.created_at,
    })
}

pub async fn create_session(data: web::Data<AppState>) -> Result<HttpResponse, MontageError> {
    let id = data.sessions.create().await;
    info!("Created session {}", id);
    Ok(HttpResponse::Created().json(serde_json::json!({ "session_id": id })))
}

pub async fn get_session(
    path: web::Path<Uuid>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, MontageError> {
    let state = data.sessions.read(path.into_inner(), canvas_state).await?;
    Ok(HttpResponse::Ok().json(state))
}

pub async fn list_sessions(data: web::Data<AppState>) -> Result<HttpResponse, MontageError> {
    let sessions = data.sessions.list().await;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "sessions": sessions })))
}

/// Builds a layer from encoded bytes: display size from the natural aspect
/// capped to the insertion box, position given or randomized inside the
/// canvas.
fn build_layer(
    compositor: &Compositor,
    source: String,
    bytes: Vec<u8>,
    x: Option<f64>,
    y: Option<f64>,
) -> Result<ImageLayer, MontageError> {
    let (natural_w, natural_h) = compositor.validate_image(&bytes)?;
    let (width, height) = Compositor::insertion_size(natural_w, natural_h);

    let mut rng = rand::thread_rng();
    let x = x.unwrap_or_else(|| rng.r#gen::<f64>() * (CANVAS_WIDTH - width));
    let y = y.unwrap_or_else(|| rng.r#gen::<f64>() * (CANVAS_HEIGHT - height));

    Ok(ImageLayer::new(source, bytes, width, height, x, y))
}

pub async fn upload_images(
    path: web::Path<Uuid>,
    mut payload: Multipart,
    data: web::Data<AppState>,
) -> Result<HttpResponse, MontageError> {
    let session_id = path.into_inner();
    let mut layers = Vec::new();

    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| MontageError::Validation(format!("Malformed upload: {}", e)))?
    {
        let filename = field
            .content_disposition()
            .get_filename()
            .ok_or_else(|| MontageError::Validation("No filename provided".to_string()))?
            .to_string();

        let mut bytes = Vec::new();
        while let Some(chunk) = field
            .try_next()
            .await
            .map_err(|e| MontageError::Validation(format!("Malformed upload: {}", e)))?
        {
            bytes.extend_from_slice(&chunk);
        }

        layers.push(build_layer(&data.compositor, filename, bytes, None, None)?);
    }

    if layers.is_empty() {
        return Err(MontageError::Validation("No images provided".to_string()));
    }

    let layer_ids: Vec<Uuid> = layers.iter().map(|l| l.id).collect();
    data.sessions
        .update(session_id, |session| {
            for layer in layers {
                session.editor.add_layer(layer);
            }
            Ok(())
        })
        .await?;

    info!("Added {} layer(s) to session {}", layer_ids.len(), session_id);
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "session_id": session_id,
        "layer_ids": layer_ids,
        "count": layer_ids.len(),
    })))
}

/// Inserts a fetched image (the stock-search flow) and selects it.
pub async fn add_image_from_url(
    path: web::Path<Uuid>,
    body: web::Json<AddUrlImageRequest>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, MontageError> {
    let session_id = path.into_inner();
    let bytes = data.pexels.download(&body.url).await?;
    let layer = build_layer(&data.compositor, body.url.clone(), bytes, body.x, body.y)?;

    let state = data
        .sessions
        .update(session_id, |session| {
            let id = session.editor.add_layer(layer);
            session.editor.select(id)?;
            Ok(canvas_state(session))
        })
        .await?;
    Ok(HttpResponse::Ok().json(state))
}

pub async fn pointer_event(
    path: web::Path<Uuid>,
    body: web::Json<PointerRequest>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, MontageError> {
    let state = data
        .sessions
        .update(path.into_inner(), |session| {
            let editor = &mut session.editor;
            match body.event {
                PointerEvent::Down => editor.pointer_down(body.x, body.y),
                PointerEvent::Move => editor.pointer_move(body.x, body.y),
                PointerEvent::Up => editor.pointer_up(),
                PointerEvent::Double => editor.double_click(body.x, body.y),
                PointerEvent::Menu => editor.open_context_menu(body.x, body.y),
                PointerEvent::Dismiss => editor.dismiss_context_menu(),
            }
            Ok(canvas_state(session))
        })
        .await?;
    Ok(HttpResponse::Ok().json(state))
}

pub async fn reorder_layer(
    path: web::Path<(Uuid, Uuid)>,
    body: web::Json<OrderRequest>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, MontageError> {
    let (session_id, layer_id) = path.into_inner();
    let state = data
        .sessions
        .update(session_id, |session| {
            match body.op {
                OrderOp::BringToFront => session.editor.bring_to_front(layer_id)?,
                OrderOp::BringForward => session.editor.bring_forward(layer_id)?,
                OrderOp::SendBackward => session.editor.send_backward(layer_id)?,
                OrderOp::SendToBack => session.editor.send_to_back(layer_id)?,
            }
            Ok(canvas_state(session))
        })
        .await?;
    Ok(HttpResponse::Ok().json(state))
}

pub async fn patch_transform(
    path: web::Path<(Uuid, Uuid)>,
    body: web::Json<TransformPatch>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, MontageError> {
    let (session_id, layer_id) = path.into_inner();
    let state = data
        .sessions
        .update(session_id, |session| {
            session
                .editor
                .set_transform(layer_id, body.scale, body.rotation)?;
            Ok(canvas_state(session))
        })
        .await?;
    Ok(HttpResponse::Ok().json(state))
}

pub async fn reset_transform(
    path: web::Path<(Uuid, Uuid)>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, MontageError> {
    let (session_id, layer_id) = path.into_inner();
    let state = data
        .sessions
        .update(session_id, |session| {
            session.editor.reset_transform(layer_id)?;
            Ok(canvas_state(session))
        })
        .await?;
    Ok(HttpResponse::Ok().json(state))
}

pub async fn remove_layer(
    path: web::Path<(Uuid, Uuid)>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, MontageError> {
    let (session_id, layer_id) = path.into_inner();
    let state = data
        .sessions
        .update(session_id, |session| {
            session.editor.remove_layer(layer_id)?;
            Ok(canvas_state(session))
        })
        .await?;
    Ok(HttpResponse::Ok().json(state))
}

pub async fn clear_canvas(
    path: web::Path<Uuid>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, MontageError> {
    let state = data
        .sessions
        .update(path.into_inner(), |session| {
            session.editor.clear();
            session.enhanced_result = None;
            session.suggestions.clear();
            session.comparison = None;
            Ok(canvas_state(session))
        })
        .await?;
    Ok(HttpResponse::Ok().json(state))
}

pub async fn download_snapshot(
    path: web::Path<Uuid>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, MontageError> {
    let png = data
        .sessions
        .read(path.into_inner(), |session| {
            data.compositor.snapshot_png(&session.editor)
        })
        .await??;
    Ok(HttpResponse::Ok().content_type("image/png").body(png))
}

/// Runs the enhancement flow: snapshot under the session lock, then the
/// long-running external jobs with the lock released, then store the result.
pub async fn enhance(
    path: web::Path<Uuid>,
    body: web::Json<EnhanceRequest>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, MontageError> {
    let session_id = path.into_inner();
    let snapshot = data
        .sessions
        .update(session_id, |session| {
            if session.editor.layers().is_empty() {
                return Err(MontageError::Validation(
                    "Add at least one image before enhancing".to_string(),
                ));
            }
            data.compositor.snapshot_jpeg_data_uri(&session.editor)
        })
        .await?;

    let prompt = body
        .prompt
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or(DEFAULT_ENHANCEMENT_PROMPT)
        .to_string();

    if body.compare {
        let outcome = data.orchestrator.enhance_pair(&snapshot, &prompt).await?;
        let response = data
            .sessions
            .update(session_id, |session| {
                session.enhanced_result = Some(outcome.winner_url.clone());
                session.comparison = Some(outcome.comparison.clone());
                // Suggestions from an earlier single run describe a different
                // image; keep the stored advice in step with the result.
                session.suggestions.clear();
                Ok(serde_json::json!({
                    "result_url": outcome.winner_url,
                    "comparison": outcome.comparison,
                }))
            })
            .await?;
        return Ok(HttpResponse::Ok().json(response));
    }

    let result_url = data.orchestrator.enhance(&snapshot, &prompt).await?;

    // Suggestion analysis is best-effort; its failure never invalidates the
    // enhancement.
    let suggestions = match data.judge.suggest_improvements(&result_url).await {
        Ok(suggestions) => suggestions,
        Err(e) => {
            error!("Suggestion analysis failed: {}", e);
            Vec::new()
        }
    };

    let response = data
        .sessions
        .update(session_id, |session| {
            session.enhanced_result = Some(result_url.clone());
            session.suggestions = suggestions.clone();
            session.comparison = None;
            Ok(serde_json::json!({
                "result_url": result_url,
                "suggestions": suggestions,
            }))
        })
        .await?;
    Ok(HttpResponse::Ok().json(response))
}

/// Follow-up text edit: the previous result is the new input and only the
/// latest result is retained.
pub async fn edit_result(
    path: web::Path<Uuid>,
    body: web::Json<EditRequest>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, MontageError> {
    let session_id = path.into_inner();
    let prompt = body.prompt.trim().to_string();
    if prompt.is_empty() {
        return Err(MontageError::Validation(
            "Edit prompt is required".to_string(),
        ));
    }

    let previous = require_result(&data, session_id).await?;
    let result_url = data.orchestrator.edit(&previous, &prompt).await?;
    store_result(&data, session_id, result_url).await
}

pub async fn apply_suggestion(
    path: web::Path<(Uuid, usize)>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, MontageError> {
    let (session_id, index) = path.into_inner();

    let (previous, suggestion) = data
        .sessions
        .read(session_id, |session| {
            (
                session.enhanced_result.clone(),
                session.suggestions.get(index).cloned(),
            )
        })
        .await?;

    let previous = previous.ok_or_else(|| {
        MontageError::Validation("Enhance the collage before applying suggestions".to_string())
    })?;
    let suggestion = suggestion
        .ok_or_else(|| MontageError::Validation(format!("No suggestion at index {}", index)))?;

    let result_url = data
        .orchestrator
        .edit(&previous, &suggestion_prompt(&suggestion))
        .await?;
    store_result(&data, session_id, result_url).await
}

async fn require_result(data: &AppState, session_id: Uuid) -> Result<String, MontageError> {
    data.sessions
        .read(session_id, |session| session.enhanced_result.clone())
        .await?
        .ok_or_else(|| MontageError::Validation("Enhance the collage before editing".to_string()))
}

async fn store_result(
    data: &AppState,
    session_id: Uuid,
    result_url: String,
) -> Result<HttpResponse, MontageError> {
    let response = data
        .sessions
        .update(session_id, |session| {
            session.enhanced_result = Some(result_url.clone());
            Ok(serde_json::json!({ "result_url": result_url }))
        })
        .await?;
    Ok(HttpResponse::Ok().json(response))
}

pub async fn pexels_search(
    query: web::Query<PexelsQuery>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, MontageError> {
    let query = query
        .query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| MontageError::Validation("Query parameter is required".to_string()))?;

    let photos = data.pexels.search(query).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "photos": photos })))
}

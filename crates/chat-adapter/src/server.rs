//! Actix Web HTTP server.
//!
//! Exposes OpenAI-compatible endpoints:
//! - `POST /v1/chat/completions`
//! - `GET /v1/models`
//! - `GET /health`

use crate::{
    config::AdapterConfig,
    dispatch::{Dispatch, Dispatcher},
    error::AdapterError,
    types::{ModelList, ModelObject},
};
use actix_cors::Cors;
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use anyhow::{Context, Result};
use futures::StreamExt;
use tracing::{debug, error, info};

pub async fn serve(config: AdapterConfig) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    info!(
        addr = %addr,
        upstream = %config.claude_base_url_trimmed(),
        fallback_key = config.api_key.is_some(),
        "chat-adapter listening"
    );

    let dispatcher = web::Data::new(Dispatcher::new(config));

    HttpServer::new(move || {
        App::new()
            .app_data(dispatcher.clone())
            .wrap(Cors::permissive())
            .configure(routes)
    })
    .bind(&addr)
    .with_context(|| format!("failed to bind {}", addr))?
    .run()
    .await
    .context("server error")?;

    Ok(())
}

/// Register the adapter's routes. Expects `web::Data<Dispatcher>` in app data.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/v1/models", web::get().to(list_models))
        .route(
            "/v1/chat/completions",
            web::post().to(handle_chat_completions),
        );
}

async fn health_check() -> &'static str {
    "OK"
}

async fn list_models(dispatcher: web::Data<Dispatcher>) -> HttpResponse {
    let data = dispatcher
        .translator()
        .models()
        .source_models()
        .map(|id| ModelObject {
            id: id.to_string(),
            object: "model".to_string(),
            owned_by: "chat-adapter".to_string(),
        })
        .collect();

    HttpResponse::Ok().json(ModelList {
        object: "list".to_string(),
        data,
    })
}

async fn handle_chat_completions(
    dispatcher: web::Data<Dispatcher>,
    req_http: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, AdapterError> {
    let authorization = req_http
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok());

    let outcome = dispatcher.handle(&body, authorization).await.inspect_err(|e| {
        debug!(error = %e, "chat completion failed");
    })?;

    match outcome {
        Dispatch::Complete(completion) => Ok(HttpResponse::Ok().json(completion)),
        Dispatch::Stream(events) => {
            let stream = events.map(|r| match r {
                Ok(event) => event
                    .to_sse()
                    .map(web::Bytes::from)
                    .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string())),
                Err(e) => {
                    error!(error = %e, "stream aborted");
                    Err(actix_web::error::ErrorInternalServerError(e.to_string()))
                }
            });

            Ok(HttpResponse::Ok()
                .content_type("text/event-stream")
                .insert_header(("cache-control", "no-cache"))
                .streaming(stream))
        }
    }
}

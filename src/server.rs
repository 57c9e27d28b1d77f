//! HTTP surface: two static status endpoints and the prediction endpoint.

use actix_cors::Cors;
use actix_multipart::Multipart;
use actix_web::{App, HttpResponse, HttpServer, get, post, web};
use bytes::BytesMut;
use futures_util::TryStreamExt;
use serde_json::json;

use crate::classifier::decode_rgb;
use crate::state::{AppConfig, AppState};

#[get("/")]
pub async fn root() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "message": "Animal Classifier API is running"
    }))
}

#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "message": "Backend is connected"
    }))
}

/// Converts any failure in the prediction flow into the uniform 500 payload.
/// The full error chain goes to the server log; only the display message
/// reaches the caller.
fn internal_error(err: impl std::fmt::Display + std::fmt::Debug + 'static) -> actix_web::Error {
    log::error!("prediction failed: {err:?}");
    actix_web::error::InternalError::from_response(
        err.to_string(),
        HttpResponse::InternalServerError().json(json!({ "detail": err.to_string() })),
    )
    .into()
}

/// Buffers the first file field of the multipart upload.
async fn read_upload(payload: &mut Multipart) -> Result<BytesMut, actix_web::Error> {
    if let Some(mut field) = payload.try_next().await.map_err(internal_error)? {
        let mut data = BytesMut::new();
        while let Some(chunk) = field.try_next().await.map_err(internal_error)? {
            data.extend_from_slice(&chunk);
        }
        return Ok(data);
    }
    Err(internal_error("request contained no file upload"))
}

#[post("/predict/")]
pub async fn predict(
    mut payload: Multipart,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, actix_web::Error> {
    let bytes = read_upload(&mut payload).await?;

    let classifier = app_state.classifier.clone();
    let top_k = app_state.top_k;

    // Decode and forward pass are CPU-bound; keep them off the async
    // executor.
    let results = web::block(move || {
        let image = decode_rgb(&bytes)?;
        classifier.predict(&image, top_k)
    })
    .await
    .map_err(internal_error)?
    .map_err(internal_error)?;

    Ok(HttpResponse::Ok().json(results))
}

pub async fn startup(config: AppConfig, app_state: AppState) -> std::io::Result<()> {
    let app_state = web::Data::new(app_state);

    log::info!("Starting server at {}:{}", config.host, config.port);

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header(),
            )
            .app_data(app_state.clone())
            .service(root)
            .service(health)
            .service(predict)
    })
    .bind((config.host, config.port))?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, test};

    #[actix_web::test]
    async fn root_reports_running() {
        let app = test::init_service(App::new().service(root)).await;
        let req = test::TestRequest::get().uri("/").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["message"], "Animal Classifier API is running");
    }

    #[actix_web::test]
    async fn health_reports_connected() {
        let app = test::init_service(App::new().service(health)).await;
        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["message"], "Backend is connected");
    }
}

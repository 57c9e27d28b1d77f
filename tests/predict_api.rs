//! End-to-end checks that exercise the real ONNX weights.
//!
//! These are skipped unless `ANIMALS_MODEL_PATH` points at the exported
//! model. The classification fixture additionally requires
//! `ANIMALS_DOG_FIXTURE` to point at a photo of a dog.

use std::sync::Arc;

use actix_web::{App, web};
use animal_classifier::classifier::{AnimalClassifier, decode_rgb};
use animal_classifier::io_struct::Prediction;
use animal_classifier::labels::CLASS_NAMES;
use animal_classifier::server::predict;
use animal_classifier::state::AppState;
use image::{Rgb, RgbImage};

fn load_classifier() -> Option<Arc<AnimalClassifier>> {
    let path = std::env::var("ANIMALS_MODEL_PATH").ok()?;
    Some(Arc::new(
        AnimalClassifier::load(&path, 1).expect("model should load from ANIMALS_MODEL_PATH"),
    ))
}

fn gradient_image() -> RgbImage {
    RgbImage::from_fn(320, 240, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    })
}

fn png_bytes(image: &RgbImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    image
        .write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageFormat::Png,
        )
        .unwrap();
    bytes
}

fn multipart_payload(bytes: &[u8]) -> (String, Vec<u8>) {
    let boundary = "----predict-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        b"Content-Disposition: form-data; name=\"file\"; filename=\"upload.png\"\r\n",
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}

#[test]
fn predict_returns_sorted_top_k() {
    let Some(classifier) = load_classifier() else {
        return;
    };
    let image = gradient_image();

    let results = classifier.predict(&image, 3).unwrap();
    assert_eq!(results.len(), 3);
    for pair in results.windows(2) {
        assert!(pair[0].confidence >= pair[1].confidence);
    }
    for result in &results {
        assert_eq!(result.class, CLASS_NAMES[result.class_idx]);
        assert!(result.confidence >= 0.0 && result.confidence <= 100.0);
    }
}

#[test]
fn full_distribution_sums_to_100_percent() {
    let Some(classifier) = load_classifier() else {
        return;
    };
    let image = gradient_image();

    let results = classifier.predict(&image, CLASS_NAMES.len()).unwrap();
    assert_eq!(results.len(), CLASS_NAMES.len());
    let total: f32 = results.iter().map(|r| r.confidence).sum();
    // Each entry is rounded to two decimals, so allow the accumulated slack.
    assert!((total - 100.0).abs() < 0.1, "total confidence {total}");
}

#[test]
fn predict_is_deterministic() {
    let Some(classifier) = load_classifier() else {
        return;
    };
    let image = gradient_image();

    let first = classifier.predict(&image, 5).unwrap();
    let second = classifier.predict(&image, 5).unwrap();
    assert_eq!(first, second);
}

#[test]
fn top_one_matches_head_of_top_five() {
    let Some(classifier) = load_classifier() else {
        return;
    };
    let image = gradient_image();

    let top_one = classifier.predict(&image, 1).unwrap();
    let top_five = classifier.predict(&image, 5).unwrap();
    assert_eq!(top_one.len(), 1);
    assert_eq!(top_five.len(), 5);
    assert_eq!(top_one[0], top_five[0]);
}

#[test]
fn oversized_top_k_truncates_to_label_set() {
    let Some(classifier) = load_classifier() else {
        return;
    };
    let image = gradient_image();

    let results = classifier.predict(&image, 50).unwrap();
    assert_eq!(results.len(), CLASS_NAMES.len());
}

#[actix_web::test]
async fn http_predict_returns_ranked_classes() {
    let Some(classifier) = load_classifier() else {
        return;
    };
    let state = AppState {
        classifier,
        top_k: 3,
    };
    let app = actix_web::test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .service(predict),
    )
    .await;

    let (content_type, body) = multipart_payload(&png_bytes(&gradient_image()));
    let req = actix_web::test::TestRequest::post()
        .uri("/predict/")
        .insert_header(("content-type", content_type))
        .set_payload(body)
        .to_request();
    let resp = actix_web::test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let results: Vec<Prediction> = actix_web::test::read_body_json(resp).await;
    assert_eq!(results.len(), 3);
    for pair in results.windows(2) {
        assert!(pair[0].confidence >= pair[1].confidence);
    }
}

#[actix_web::test]
async fn http_predict_rejects_non_image_payload() {
    let Some(classifier) = load_classifier() else {
        return;
    };
    let state = AppState {
        classifier,
        top_k: 3,
    };
    let app = actix_web::test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .service(predict),
    )
    .await;

    let (content_type, body) = multipart_payload(b"this is not an image");
    let req = actix_web::test::TestRequest::post()
        .uri("/predict/")
        .insert_header(("content-type", content_type))
        .set_payload(body)
        .to_request();
    let resp = actix_web::test::call_service(&app, req).await;
    assert_eq!(resp.status(), 500);

    let body: serde_json::Value = actix_web::test::read_body_json(resp).await;
    assert!(body["detail"].is_string());
}

#[test]
fn dog_fixture_classifies_as_dog() {
    let Some(classifier) = load_classifier() else {
        return;
    };
    let Ok(fixture) = std::env::var("ANIMALS_DOG_FIXTURE") else {
        return;
    };
    let bytes = std::fs::read(fixture).expect("fixture should be readable");
    let image = decode_rgb(&bytes).expect("fixture should decode");

    let results = classifier.predict(&image, 3).unwrap();
    assert_eq!(results[0].class, "dog");
    assert!(results[0].confidence > 50.0, "top-1 {:?}", results[0]);
}

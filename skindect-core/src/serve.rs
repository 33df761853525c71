use crate::{
    data,
    error::Error,
    model::{CLASS_NAMES, IMAGE_SIZE, NUM_CLASSES},
    predict::Predictor,
    report::Ranking,
};
use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use burn::prelude::*;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::info;

const ALLOWED_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "bmp"];
const USAGE_CURL: &str = "curl -X POST -F \"file=@image.jpg\" http://localhost:5000/predict";

/// The service's only two states. The transition to `Ready` happens once,
/// before the listener binds; there is no reload path.
pub enum ModelState<B: Backend> {
    Unloaded,
    Ready(Predictor<B>),
}

impl<B: Backend> ModelState<B> {
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    fn predictor(&self) -> Option<&Predictor<B>> {
        match self {
            Self::Ready(predictor) => Some(predictor),
            Self::Unloaded => None,
        }
    }
}

/// Shared read-only state; the model is never mutated per request, so no
/// locking is needed.
pub struct AppState<B: Backend> {
    pub model: ModelState<B>,
}

/// The `/predict` 200 body.
#[derive(Debug, Serialize)]
struct PredictionResponse {
    success: bool,
    predicted_class: &'static str,
    confidence: f64,
    all_predictions: Map<String, Value>,
    image_size: [usize; 2],
    model_info: ModelInfo,
}

#[derive(Debug, Serialize)]
struct ModelInfo {
    architecture: &'static str,
    classes: usize,
}

/// A structured JSON error with its status code. Every failure path goes
/// through this type so clients never see a framework error page.
struct ApiError {
    status: StatusCode,
    body: Value,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match &err {
            Error::NoFileUploaded => ApiError {
                status: StatusCode::BAD_REQUEST,
                body: json!({ "error": err.to_string(), "usage": USAGE_CURL }),
            },
            Error::NoFileSelected | Error::InvalidExtension(_) | Error::Decode(_) => ApiError {
                status: StatusCode::BAD_REQUEST,
                body: json!({ "error": err.to_string() }),
            },
            Error::Inference(details) => ApiError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: json!({ "error": "Prediction failed", "details": details }),
            },
            // startup-only and CLI-only variants; kept total instead of panicking
            Error::WeightsNotFound(_) | Error::WeightsLoad(_) | Error::Visualization(_) => {
                ApiError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    body: json!({ "error": "Internal server error", "details": err.to_string() }),
                }
            }
        }
    }
}

fn model_not_loaded() -> ApiError {
    ApiError {
        status: StatusCode::SERVICE_UNAVAILABLE,
        body: json!({ "error": "Model not loaded. Please restart the server." }),
    }
}

pub fn router<B: Backend>(state: Arc<AppState<B>>, body_limit: usize) -> Router {
    Router::new()
        .route("/", get(home::<B>))
        .route("/health", get(health::<B>))
        .route("/classes", get(classes))
        .route("/predict", post(predict::<B>))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(CatchPanicLayer::custom(panic_response))
        .with_state(state)
}

/// Load the listener and serve until the process is stopped.
pub async fn serve<B: Backend>(
    predictor: Predictor<B>,
    host: &str,
    port: u16,
    body_limit: usize,
) -> anyhow::Result<()> {
    let state = Arc::new(AppState {
        model: ModelState::Ready(predictor),
    });
    let app = router(state, body_limit);
    let listener = TcpListener::bind((host, port)).await?;
    info!("serving on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn home<B: Backend>(State(state): State<Arc<AppState<B>>>) -> Json<Value> {
    Json(json!({
        "message": "Skin Disease Prediction API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "model_loaded": state.model.is_loaded(),
        "endpoints": {
            "/": "GET - API information",
            "/predict": "POST - Upload image for prediction (multipart/form-data with key \"file\")",
            "/health": "GET - Check API health status",
            "/classes": "GET - Get available disease classes"
        },
        "usage": {
            "curl": USAGE_CURL,
            "python": "requests.post(\"http://localhost:5000/predict\", files={\"file\": open(\"image.jpg\", \"rb\")})"
        }
    }))
}

async fn health<B: Backend>(State(state): State<Arc<AppState<B>>>) -> Response {
    if state.model.is_loaded() {
        Json(json!({
            "status": "healthy",
            "model_loaded": true,
            "classes_count": NUM_CLASSES,
            "image_size": [IMAGE_SIZE, IMAGE_SIZE]
        }))
        .into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "error",
                "message": "Model not loaded",
                "model_loaded": false
            })),
        )
            .into_response()
    }
}

async fn classes() -> Json<Value> {
    Json(json!({ "classes": CLASS_NAMES, "count": NUM_CLASSES }))
}

async fn predict<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResponse>, ApiError> {
    if !state.model.is_loaded() {
        return Err(model_not_loaded());
    }
    let multipart = multipart.map_err(|_| Error::NoFileUploaded)?;
    let (filename, bytes) = file_field(multipart).await?;
    if filename.is_empty() {
        return Err(Error::NoFileSelected.into());
    }
    check_extension(&filename)?;

    let image = data::decode_image(&bytes)?;
    let predictor = state.model.predictor().ok_or_else(model_not_loaded)?;
    let ranking = Ranking::new(&predictor.predict(&image)?);
    info!(
        predicted_class = ranking.predicted_class(),
        confidence = ranking.confidence(),
        "prediction served"
    );

    Ok(Json(PredictionResponse {
        success: true,
        predicted_class: ranking.predicted_class(),
        confidence: ranking.confidence(),
        all_predictions: ranking.to_json_map(),
        image_size: [IMAGE_SIZE, IMAGE_SIZE],
        model_info: ModelInfo {
            architecture: "Xception",
            classes: NUM_CLASSES,
        },
    }))
}

async fn not_found() -> ApiError {
    ApiError {
        status: StatusCode::NOT_FOUND,
        body: json!({
            "error": "Endpoint not found",
            "message": "Please check the API documentation",
            "available_endpoints": ["GET /", "GET /health", "GET /classes", "POST /predict"]
        }),
    }
}

fn panic_response(err: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let details = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic".to_string()
    };
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Internal server error", "message": details })),
    )
        .into_response()
}

/// Pull the `file` field out of the form.
async fn file_field(mut multipart: Multipart) -> Result<(String, Bytes), Error> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::Decode(e.to_string()))?
    {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or_default().to_owned();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| Error::Decode(e.to_string()))?;
            return Ok((filename, bytes));
        }
    }
    Err(Error::NoFileUploaded)
}

fn check_extension(filename: &str) -> Result<(), Error> {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    if ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        Ok(())
    } else {
        Err(Error::InvalidExtension(ALLOWED_EXTENSIONS.join(", ")))
    }
}

#[cfg(test)]
#[cfg(feature = "ndarray")]
mod tests {
    use super::*;
    use crate::model::SkinClassifierConfig;
    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    type B = burn::backend::NdArray<f32>;

    const BODY_LIMIT: usize = 1024 * 1024;

    fn unloaded_router() -> Router {
        router(
            Arc::new(AppState {
                model: ModelState::<B>::Unloaded,
            }),
            BODY_LIMIT,
        )
    }

    fn ready_router() -> Router {
        let device = Default::default();
        // shallow middle flow keeps the test model cheap to build and run
        let model = SkinClassifierConfig::new()
            .with_middle_blocks(1)
            .init::<B>(&device);
        router(
            Arc::new(AppState {
                model: ModelState::Ready(Predictor::from_model(model, device)),
            }),
            BODY_LIMIT,
        )
    }

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn upload_request(field: &str, filename: Option<&str>, content: &[u8]) -> Request<Body> {
        let boundary = "skindect-test-boundary";
        let mut body = Vec::new();
        let disposition = match filename {
            Some(name) => format!("form-data; name=\"{field}\"; filename=\"{name}\""),
            None => format!("form-data; name=\"{field}\"; filename=\"\""),
        };
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: {disposition}\r\n\
                 Content-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
        Request::builder()
            .method("POST")
            .uri("/predict")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn home_reports_model_state() {
        let response = unloaded_router()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["model_loaded"], false);
        assert_eq!(body["message"], "Skin Disease Prediction API");
    }

    #[tokio::test]
    async fn health_unloaded_is_service_unavailable() {
        let response = unloaded_router()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["model_loaded"], false);
    }

    #[tokio::test]
    async fn classes_lists_all_labels() {
        let response = unloaded_router()
            .oneshot(
                Request::builder()
                    .uri("/classes")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["count"].as_u64().unwrap() as usize, NUM_CLASSES);
        assert_eq!(body["classes"].as_array().unwrap().len(), NUM_CLASSES);
    }

    #[tokio::test]
    async fn predict_without_model_is_service_unavailable() {
        let response = unloaded_router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/predict")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("Model not loaded"));
    }

    #[tokio::test]
    async fn predict_without_file_field_is_bad_request() {
        let response = ready_router()
            .oneshot(upload_request("attachment", Some("image.jpg"), b"data"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("No file uploaded"));
    }

    #[tokio::test]
    async fn predict_with_empty_filename_is_bad_request() {
        let response = ready_router()
            .oneshot(upload_request("file", None, b"data"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "No file selected");
    }

    #[tokio::test]
    async fn predict_rejects_txt_uploads_regardless_of_content() {
        let response = ready_router()
            .oneshot(upload_request("file", Some("note.txt"), b"not an image"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("Invalid file type"));
    }

    #[tokio::test]
    async fn predict_success_body_is_ranked_and_complete() {
        let mut png = Vec::new();
        image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(32, 32, image::Rgb([180, 120, 90])))
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let response = ready_router()
            .oneshot(upload_request("file", Some("lesion.png"), &png))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["image_size"], json!([IMAGE_SIZE, IMAGE_SIZE]));
        assert_eq!(body["model_info"]["architecture"], "Xception");
        assert_eq!(
            body["model_info"]["classes"].as_u64().unwrap() as usize,
            NUM_CLASSES
        );
        let predictions = body["all_predictions"].as_object().unwrap();
        assert_eq!(predictions.len(), NUM_CLASSES);
        let percents: Vec<f64> = predictions.values().map(|v| v.as_f64().unwrap()).collect();
        assert!(
            percents.windows(2).all(|pair| pair[0] >= pair[1]),
            "predictions not in descending order: {percents:?}"
        );
        let total: f64 = percents.iter().sum();
        assert!((total - 100.0).abs() < 0.1, "percents sum to {total}");
        let (top_label, top_value) = predictions.iter().next().unwrap();
        assert_eq!(body["predicted_class"].as_str().unwrap(), top_label);
        assert_eq!(body["confidence"], *top_value);
    }

    #[tokio::test]
    async fn predict_reports_decode_failures() {
        let response = ready_router()
            .oneshot(upload_request("file", Some("image.png"), b"corrupt bytes"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"]
            .as_str()
            .unwrap()
            .contains("Error processing image"));
    }

    #[tokio::test]
    async fn unknown_route_returns_structured_json() {
        let response = unloaded_router()
            .oneshot(
                Request::builder()
                    .uri("/nonexistent")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Endpoint not found");
    }

    #[test]
    fn extension_check_is_case_insensitive_and_uses_last_dot() {
        assert!(check_extension("photo.JPG").is_ok());
        assert!(check_extension("scan.jpeg").is_ok());
        assert!(check_extension("archive.tar.gz").is_err());
        assert!(check_extension("noextension").is_err());
        assert!(check_extension("note.txt").is_err());
    }
}

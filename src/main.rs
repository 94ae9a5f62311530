use actix_web::{middleware, web, App, HttpServer};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

mod handlers;

use handlers::{estimate, health};
use overtake::artifacts::{ArtifactStore, INFERENCE_INPUTS};
use overtake::EstimationContext;

/// Application state shared across handlers
pub struct AppState {
    /// `None` until training artifacts exist
    pub context: Option<EstimationContext>,
    pub model_dir: PathBuf,
    /// Artifacts absent at start-up
    pub missing: Vec<String>,
    /// Load failure other than missing artifacts
    pub load_error: Option<String>,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let addr = format!("{}:{}", host, port);

    let model_dir = std::env::var("MODEL_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("models"));

    info!("Loading estimation artifacts from {:?}", model_dir);

    let (context, load_error) = match EstimationContext::load(&model_dir) {
        Ok(ctx) => {
            info!("Model {} ready", ctx.model_name());
            (Some(ctx), None)
        }
        Err(e) if e.is_not_ready() => {
            warn!("{}", e);
            (None, None)
        }
        Err(e) => {
            error!("Failed to load artifacts: {}", e);
            (None, Some(e.to_string()))
        }
    };
    let missing = ArtifactStore::new(&model_dir).missing(&INFERENCE_INPUTS);

    let app_state = Arc::new(AppState {
        context,
        model_dir,
        missing,
        load_error,
    });

    info!("Starting overtake estimation server at http://{}", addr);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(middleware::Logger::default())
            .route("/health", web::get().to(health::health_check))
            .route("/estimate", web::post().to(estimate::estimate_overtake))
    })
    .bind(&addr)?
    .run()
    .await
}

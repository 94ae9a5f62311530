use actix_web::{web, HttpResponse};
use std::sync::Arc;

use overtake::error::PipelineError;
use overtake::models::OvertakeQuery;

use crate::AppState;

/// Estimate the overtake probability for one attacker/defender query
pub async fn estimate_overtake(
    state: web::Data<Arc<AppState>>,
    req: web::Json<OvertakeQuery>,
) -> Result<HttpResponse, PipelineError> {
    let context = match (&state.context, &state.load_error) {
        (Some(context), _) => context,
        (None, Some(reason)) => {
            return Err(PipelineError::Model(format!(
                "estimation context failed to load: {}",
                reason
            )))
        }
        (None, None) => {
            return Err(PipelineError::ArtifactsNotReady {
                dir: state.model_dir.clone(),
                missing: state.missing.clone(),
            })
        }
    };

    let estimate = context.estimate(&req)?;
    Ok(HttpResponse::Ok().json(estimate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test, App};
    use overtake::models::{AttackerState, Compound, DefenderState};
    use std::path::PathBuf;

    fn query() -> OvertakeQuery {
        OvertakeQuery {
            attacker: AttackerState {
                standing: 5,
                pace: 84.5,
                tire_age: 12,
                compound: Compound::Medium,
            },
            defender: DefenderState {
                pace: 85.2,
                tire_age: 25,
                compound: Compound::Hard,
            },
        }
    }

    async fn post_estimate(state: AppState) -> StatusCode {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(Arc::new(state)))
                .route("/estimate", web::post().to(estimate_overtake)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/estimate")
            .set_json(query())
            .to_request();
        test::call_service(&app, req).await.status()
    }

    #[actix_web::test]
    async fn test_estimate_without_model_is_503() {
        let status = post_estimate(AppState {
            context: None,
            model_dir: PathBuf::from("models"),
            missing: vec!["best_model.json".to_string()],
            load_error: None,
        })
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[actix_web::test]
    async fn test_estimate_with_broken_artifacts_is_500() {
        let status = post_estimate(AppState {
            context: None,
            model_dir: PathBuf::from("models"),
            missing: Vec::new(),
            load_error: Some("feature order mismatch".to_string()),
        })
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}

use assessment_backend::services::identity_service::IdentityService;
use assessment_backend::services::scheduler_service::SchedulerService;
use assessment_backend::store::pg::PgStore;
use assessment_backend::{
    config::{get_config, init_config},
    database::pool::create_pool,
    routes, AppState,
};
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    init_config()?;
    let config = get_config();

    let pool = create_pool().await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let store = Arc::new(PgStore::new(pool));
    let identity_service = IdentityService::new(
        config.identity_service_url.clone(),
        config.identity_timeout_secs,
    );
    let app_state = AppState::new(store.clone(), identity_service, config.publish_chunk_size);

    {
        let scheduler = SchedulerService::new(
            store.clone(),
            Duration::from_secs(config.trigger_poll_secs),
        );
        let shutdown = app_state.shutdown.child_token();
        tokio::spawn(async move {
            scheduler.run(shutdown).await;
        });
    }

    let base_routes = Router::new().route("/health", get(routes::health::health));

    let management_api = Router::new()
        .route(
            "/api/assessments",
            get(routes::assessments::list_assessments).post(routes::assessments::create_assessment),
        )
        .route(
            "/api/assessments/:id",
            get(routes::assessments::get_assessment),
        )
        .route(
            "/api/assessments/:id/schedule",
            post(routes::assessments::schedule_assessment),
        )
        .route(
            "/api/assessments/:id/questions",
            get(routes::assessments::list_questions).post(routes::assessments::add_question),
        )
        .route(
            "/api/assessments/:id/submissions",
            get(routes::assessments::list_submissions),
        )
        .route(
            "/api/assessments/:id/submissions/:submission_id/answers",
            post(routes::assessments::add_answer),
        )
        .route(
            "/api/assessments/:id/submissions/:submission_id/grade",
            post(routes::assessments::grade_submission),
        )
        .route(
            "/api/assessments/:id/submissions/:submission_id/return",
            post(routes::assessments::return_submission),
        )
        .route(
            "/api/assessments/:id/submissions/:submission_id/reject",
            post(routes::assessments::reject_submission),
        )
        .route(
            "/api/assessments/:id/publish",
            post(routes::assessments::publish_results),
        )
        .route(
            "/api/assessments/:id/results",
            get(routes::assessments::list_results),
        )
        .route(
            "/api/assessments/:id/roster-report",
            get(routes::assessments::roster_report),
        )
        .layer(axum::middleware::from_fn(
            assessment_backend::middleware::auth::require_instructor_or_admin,
        ))
        .layer(axum::middleware::from_fn_with_state(
            assessment_backend::middleware::rate_limit::new_rps_state("management", config.api_rps),
            assessment_backend::middleware::rate_limit::rps_middleware,
        ));

    let student_api = Router::new()
        .route(
            "/api/student/assessments",
            get(routes::assessments::list_assessments),
        )
        .route(
            "/api/student/assessments/:id",
            get(routes::assessments::get_assessment),
        )
        .route(
            "/api/student/assessments/:id/submissions/start",
            post(routes::submissions::start_submission),
        )
        .route(
            "/api/student/assessments/:id/submissions/submit",
            post(routes::submissions::submit_submission),
        )
        .route(
            "/api/student/assessments/:id/submissions/resubmit",
            post(routes::submissions::resubmit_submission),
        )
        .route(
            "/api/student/assessments/:id/submissions/cancel",
            post(routes::submissions::cancel_submission),
        )
        .route(
            "/api/student/assessments/:id/result",
            get(routes::submissions::my_result),
        )
        .route(
            "/api/student/assessments/:id/results",
            get(routes::submissions::list_results),
        )
        .layer(axum::middleware::from_fn(
            assessment_backend::middleware::auth::require_bearer_auth,
        ))
        .layer(axum::middleware::from_fn_with_state(
            assessment_backend::middleware::rate_limit::new_rps_state("student", config.student_rps),
            assessment_backend::middleware::rate_limit::rps_middleware,
        ));

    let app = base_routes
        .merge(management_api)
        .merge(student_api)
        .with_state(app_state.clone())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown({
            let shutdown = app_state.shutdown.clone();
            async move {
                let _ = tokio::signal::ctrl_c().await;
                shutdown.cancel();
            }
        })
        .await?;

    Ok(())
}

pub mod access;
pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;

use crate::services::{
    assessment_service::AssessmentService, identity_service::IdentityService,
    submission_service::SubmissionService,
};
use crate::store::LifecycleStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LifecycleStore>,
    pub assessment_service: AssessmentService,
    pub submission_service: SubmissionService,
    pub identity_service: IdentityService,
    /// Root token for graceful shutdown; long batch operations take child
    /// tokens from it.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        store: Arc<dyn LifecycleStore>,
        identity_service: IdentityService,
        publish_chunk_size: usize,
    ) -> Self {
        let assessment_service = AssessmentService::new(store.clone());
        let submission_service = SubmissionService::new(store.clone(), publish_chunk_size);

        Self {
            store,
            assessment_service,
            submission_service,
            identity_service,
            shutdown: CancellationToken::new(),
        }
    }
}

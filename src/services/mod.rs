pub mod assessment_service;
pub mod grading_service;
pub mod identity_service;
pub mod scheduler_service;
pub mod submission_service;

pub mod assessment;
pub mod question;
pub mod submission;
pub mod trigger;
pub mod user;

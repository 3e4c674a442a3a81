use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Profile payload served by the external identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Instructor,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Instructor => "INSTRUCTOR",
            Role::Student => "STUDENT",
        }
    }

    /// Role names arrive as free-form claim strings; matching is
    /// case-insensitive, anything unrecognized is None.
    pub fn parse(raw: &str) -> Option<Role> {
        if raw.eq_ignore_ascii_case("admin") {
            Some(Role::Admin)
        } else if raw.eq_ignore_ascii_case("instructor") {
            Some(Role::Instructor)
        } else if raw.eq_ignore_ascii_case("student") {
            Some(Role::Student)
        } else {
            None
        }
    }
}

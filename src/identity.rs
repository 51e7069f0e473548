use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Some(Self::Student),
            "teacher" => Some(Self::Teacher),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Teacher => "teacher",
            Self::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The acting principal, as handed over by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// True when this actor may manage a classroom owned by `teacher_id`.
    pub fn owns(&self, teacher_id: &str) -> bool {
        self.is_admin() || (self.role == Role::Teacher && self.id == teacher_id)
    }

    pub fn require_role(&self, role: Role, what: &str) -> CoreResult<()> {
        if self.role == role {
            Ok(())
        } else {
            Err(CoreError::forbidden(format!("only a {} can {}", role, what)))
        }
    }

    pub fn require_owner(&self, teacher_id: &str) -> CoreResult<()> {
        if self.owns(teacher_id) {
            Ok(())
        } else {
            Err(CoreError::forbidden(
                "requires the owning teacher or an admin",
            ))
        }
    }
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Dashboard roles, ordered by privilege.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Viewer,
    Editor,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Editor => "editor",
            Role::Admin => "admin",
        }
    }

    pub fn allows(self, required: Role) -> bool {
        self >= required
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "viewer" => Ok(Role::Viewer),
            "editor" => Ok(Role::Editor),
            "admin" => Ok(Role::Admin),
            other => Err(AppError::Invalid(format!("unknown role '{other}'"))),
        }
    }
}

/// The identity running the dashboard, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Operator {
    pub email: Option<String>,
    pub role: Role,
}

impl Operator {
    pub fn require(&self, required: Role) -> Result<(), AppError> {
        if self.role.allows(required) {
            Ok(())
        } else {
            Err(AppError::Forbidden {
                required,
                actual: self.role,
            })
        }
    }

    /// Mutations: create, update, toggle.
    pub fn require_editor(&self) -> Result<(), AppError> {
        self.require(Role::Editor)
    }

    /// Destructive actions: delete, revoke, role changes.
    pub fn require_admin(&self) -> Result<(), AppError> {
        self.require(Role::Admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operator(role: Role) -> Operator {
        Operator {
            email: Some("ops@example.com".to_string()),
            role,
        }
    }

    #[test]
    fn roles_are_ordered_by_privilege() {
        assert!(Role::Admin.allows(Role::Editor));
        assert!(Role::Editor.allows(Role::Viewer));
        assert!(!Role::Viewer.allows(Role::Editor));
        assert!(!Role::Editor.allows(Role::Admin));
    }

    #[test]
    fn editors_cannot_delete() {
        let editor = operator(Role::Editor);
        assert!(editor.require_editor().is_ok());
        let err = editor.require_admin().unwrap_err();
        assert_eq!(
            err.to_string(),
            "This action requires the admin role (current role: editor)"
        );
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("Admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(" viewer ".parse::<Role>().unwrap(), Role::Viewer);
        assert!("owner".parse::<Role>().is_err());
    }
}

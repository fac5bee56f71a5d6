//! Identity references.
//!
//! Identities are owned by the portal's identity provider. The chat core
//! only keeps snapshots of the display fields it needs to render history.

use serde::{Deserialize, Serialize};

/// Portal roles. Every entry point normalizes through [`Role::normalize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    #[default]
    Student,
    Other,
    Parent,
    Sponsor,
}

impl Role {
    /// Normalize a raw role string: missing means `student`, anything
    /// unrecognized means `other`.
    pub fn normalize(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return Self::Student;
        };
        match raw.to_lowercase().as_str() {
            "admin" => Self::Admin,
            "teacher" => Self::Teacher,
            "student" => Self::Student,
            "other" => Self::Other,
            "parent" => Self::Parent,
            "sponsor" => Self::Sponsor,
            _ => Self::Other,
        }
    }

    /// Convert to the stored string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Teacher => "teacher",
            Self::Student => "student",
            Self::Other => "other",
            Self::Parent => "parent",
            Self::Sponsor => "sponsor",
        }
    }

    /// Roles that may moderate (delete other people's messages).
    pub fn is_staff(&self) -> bool {
        matches!(self, Self::Admin | Self::Teacher)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which portal collection the identity lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum IdentityModel {
    #[default]
    User,
    Admin,
}

impl IdentityModel {
    pub fn for_role(role: Role) -> Self {
        if role == Role::Admin {
            Self::Admin
        } else {
            Self::User
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Admin => "Admin",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "Admin" => Self::Admin,
            _ => Self::User,
        }
    }
}

/// Model recorded on a deletion tombstone, derived from the actor's role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeletedByModel {
    User,
    Teacher,
    Admin,
}

impl DeletedByModel {
    pub fn for_role(role: Role) -> Self {
        match role {
            Role::Admin => Self::Admin,
            Role::Teacher => Self::Teacher,
            _ => Self::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Teacher => "Teacher",
            Self::Admin => "Admin",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "Admin" => Self::Admin,
            "Teacher" => Self::Teacher,
            _ => Self::User,
        }
    }
}

pub const DEFAULT_AVATAR: &str = "👤";
pub const SYSTEM_IDENTITY_ID: &str = "system";

/// Snapshot of an identity as the chat core sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    #[serde(rename = "model")]
    pub display_model: IdentityModel,
    pub name: String,
    pub role: Role,
    pub avatar: String,
}

impl Identity {
    /// Build an identity from raw fields, normalizing role and avatar.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        role: Option<&str>,
        avatar: Option<String>,
    ) -> Self {
        let role = Role::normalize(role);
        Self {
            id: id.into(),
            display_model: IdentityModel::for_role(role),
            name: name.into(),
            role,
            avatar: avatar
                .filter(|a| !a.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_AVATAR.to_string()),
        }
    }

    /// Sender of membership announcements and other server-authored lines.
    pub fn system() -> Self {
        Self {
            id: SYSTEM_IDENTITY_ID.to_string(),
            display_model: IdentityModel::Admin,
            name: "System".to_string(),
            role: Role::Admin,
            avatar: "🤖".to_string(),
        }
    }

    pub fn to_ref(&self) -> IdentityRef {
        IdentityRef {
            id: self.id.clone(),
            model: self.display_model,
            name: self.name.clone(),
        }
    }
}

/// Compact reference stored in reaction and read-receipt entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRef {
    pub id: String,
    pub model: IdentityModel,
    pub name: String,
}

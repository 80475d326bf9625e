//! Role names and the encoding of roles into the `profiles.role` column.
//!
//! The `profiles` table carries a check constraint that only admits
//! [`ROLE_USER`] and [`ROLE_FIREFIGHTER`]. Dispatcher capability is derived
//! from the `dispatchers` linkage instead (see [`crate::identity`]), so the
//! stored value is an encoding detail and never the source of authority.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

pub const ROLE_USER: &str = "user";
pub const ROLE_FIREFIGHTER: &str = "firefighter";
pub const ROLE_DISPATCHER: &str = "dispatcher";
pub const ROLE_ADMIN: &str = "admin";

/// Values accepted by the `profiles.role` check constraint.
///
/// Must match `ck_profiles_role` in `20260101000003_create_profiles.sql`.
pub const STORED_PROFILE_ROLES: &[&str] = &[ROLE_USER, ROLE_FIREFIGHTER];

/// The role an identity acts under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Firefighter,
    Dispatcher,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => ROLE_USER,
            Role::Firefighter => ROLE_FIREFIGHTER,
            Role::Dispatcher => ROLE_DISPATCHER,
            Role::Admin => ROLE_ADMIN,
        }
    }

    /// The value written to `profiles.role` for an identity with this role.
    pub fn stored_profile_role(self) -> &'static str {
        match self {
            Role::Firefighter => ROLE_FIREFIGHTER,
            Role::User | Role::Dispatcher | Role::Admin => ROLE_USER,
        }
    }

    /// Decode a `profiles.role` column value.
    ///
    /// Never yields [`Role::Dispatcher`] or [`Role::Admin`]; those are not
    /// representable in the stored encoding.
    pub fn from_stored_profile_role(value: &str) -> Result<Self, CoreError> {
        match value {
            ROLE_USER => Ok(Role::User),
            ROLE_FIREFIGHTER => Ok(Role::Firefighter),
            other => Err(CoreError::Validation(format!(
                "Invalid stored profile role '{other}'. Must be one of: {}",
                STORED_PROFILE_ROLES.join(", ")
            ))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ROLE_USER => Ok(Role::User),
            ROLE_FIREFIGHTER => Ok(Role::Firefighter),
            ROLE_DISPATCHER => Ok(Role::Dispatcher),
            ROLE_ADMIN => Ok(Role::Admin),
            other => Err(CoreError::Validation(format!("Unknown role '{other}'"))),
        }
    }
}

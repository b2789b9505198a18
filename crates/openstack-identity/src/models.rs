//! Identity models for tenants, users and roles.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// A tenant (project) as returned by the identity API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tenant {
    /// Tenant identifier.
    pub id: String,
    /// Tenant name.
    pub name: String,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the tenant is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

/// A user as returned by the identity API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// User identifier.
    pub id: String,
    /// Login name.
    pub name: String,
    /// Default tenant.
    #[serde(
        default,
        rename = "tenantId",
        alias = "tenant_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub tenant_id: Option<String>,
    /// Email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Whether the user is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

/// A role from `/OS-KSADM/roles`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Role {
    /// Role identifier.
    pub id: String,
    /// Role name.
    pub name: String,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Request payload for creating a tenant.
#[derive(Debug, Clone, Serialize, Validate, PartialEq, Eq)]
pub struct CreateTenantRequest {
    /// Tenant name.
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    /// Description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the tenant starts enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl CreateTenantRequest {
    /// Create a request for the named tenant.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            enabled: None,
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the enabled flag.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }
}

/// Request payload for creating a user.
#[derive(Debug, Clone, Serialize, Validate, PartialEq, Eq)]
pub struct CreateUserRequest {
    /// Login name.
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    /// Initial password.
    #[validate(length(min = 1))]
    pub password: String,
    /// Email address.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(email)]
    pub email: Option<String>,
    /// Default tenant.
    #[serde(rename = "tenantId", skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    /// Whether the user starts enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl CreateUserRequest {
    /// Create a request with the mandatory fields.
    pub fn new(name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            password: password.into(),
            email: None,
            tenant_id: None,
            enabled: None,
        }
    }

    /// Set the email address.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Set the default tenant.
    #[must_use]
    pub fn with_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }
}

/// Request payload for updating a user. Only set fields are sent.
#[derive(Debug, Clone, Default, Serialize, Validate, PartialEq, Eq)]
pub struct UpdateUserRequest {
    /// New login name.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    /// New password.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// New email address.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(email)]
    pub email: Option<String>,
    /// New enabled flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

/// Grants a role to a user on a tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAssignment {
    /// User receiving the role.
    pub user_id: String,
    /// Tenant the role applies to.
    pub tenant_id: String,
    /// Role to grant.
    pub role_id: String,
}

impl RoleAssignment {
    /// Create an assignment.
    pub fn new(
        user_id: impl Into<String>,
        tenant_id: impl Into<String>,
        role_id: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            tenant_id: tenant_id.into(),
            role_id: role_id.into(),
        }
    }
}

/// Wire form of a role reference.
#[derive(Debug, Serialize)]
pub(crate) struct RoleRef<'a> {
    #[serde(rename = "tenantId")]
    pub tenant_id: &'a str,
    #[serde(rename = "roleId")]
    pub role_id: &'a str,
}

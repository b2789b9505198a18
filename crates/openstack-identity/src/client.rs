//! Asynchronous identity client implementation.

use crate::models::{
    CreateTenantRequest, CreateUserRequest, Role, RoleAssignment, RoleRef, Tenant,
    UpdateUserRequest, User,
};
use crate::Result;
use openstack_core::{Connection, Error, HttpMethod, RequestOptions, Response, ServiceType};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};
use url::form_urlencoded;
use validator::Validate;

/// Client for the identity admin resources.
///
/// Every call goes through [`Connection::req`], so it is authenticated, prefixed
/// with the identity service path and re-authenticated on token expiry.
#[derive(Debug, Clone)]
pub struct IdentityClient {
    connection: Arc<Connection>,
    admin_port: Option<u16>,
}

impl IdentityClient {
    /// Wrap a connection bound to the identity service.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the connection serves another
    /// service type.
    pub fn new(connection: Arc<Connection>) -> Result<Self> {
        let service_type = connection.config().service_type;
        if service_type != ServiceType::Identity {
            return Err(Error::InvalidArgument(format!(
                "Identity client needs an identity connection, got {}",
                service_type.name()
            )));
        }
        Ok(Self {
            connection,
            admin_port: None,
        })
    }

    /// Send every call to this port on the identity host (e.g. 35357).
    #[must_use]
    pub fn with_admin_port(mut self, port: u16) -> Self {
        self.admin_port = Some(port);
        self
    }

    /// Underlying connection.
    #[must_use]
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// List all tenants.
    pub async fn list_tenants(&self) -> Result<Vec<Tenant>> {
        let response = self.send(HttpMethod::Get, "/tenants", self.options()).await?;
        envelope(&response, "tenants")
    }

    /// Create a tenant.
    pub async fn create_tenant(&self, request: &CreateTenantRequest) -> Result<Tenant> {
        request.validate()?;
        let tenant: Tenant = self
            .send_json(HttpMethod::Post, "/tenants", &json!({ "tenant": request }), "tenant")
            .await?;
        info!(tenant_id = %tenant.id, name = %tenant.name, "created tenant");
        Ok(tenant)
    }

    /// Look a tenant up by exact name.
    pub async fn find_tenant_by_name(&self, name: &str) -> Result<Tenant> {
        let encoded: String = form_urlencoded::byte_serialize(name.as_bytes()).collect();
        let path = format!("/tenants?name={encoded}");
        let response = self.send(HttpMethod::Get, &path, self.options()).await?;
        envelope(&response, "tenant")
    }

    /// Delete a tenant.
    pub async fn delete_tenant(&self, tenant_id: &str) -> Result<()> {
        let path = format!("/tenants/{tenant_id}");
        self.send(HttpMethod::Delete, &path, self.options()).await?;
        info!(tenant_id, "deleted tenant");
        Ok(())
    }

    /// List all users.
    pub async fn list_users(&self) -> Result<Vec<User>> {
        let response = self.send(HttpMethod::Get, "/users", self.options()).await?;
        envelope(&response, "users")
    }

    /// Create a user.
    pub async fn create_user(&self, request: &CreateUserRequest) -> Result<User> {
        request.validate()?;
        let user: User = self
            .send_json(HttpMethod::Post, "/users", &json!({ "user": request }), "user")
            .await?;
        info!(user_id = %user.id, name = %user.name, "created user");
        Ok(user)
    }

    /// Update the given fields of a user.
    pub async fn update_user(&self, user_id: &str, request: &UpdateUserRequest) -> Result<User> {
        request.validate()?;
        let path = format!("/users/{user_id}");
        self.send_json(HttpMethod::Put, &path, &json!({ "user": request }), "user")
            .await
    }

    /// Delete a user.
    pub async fn delete_user(&self, user_id: &str) -> Result<()> {
        let path = format!("/users/{user_id}");
        self.send(HttpMethod::Delete, &path, self.options()).await?;
        info!(user_id, "deleted user");
        Ok(())
    }

    /// Grant a role to a user on a tenant.
    pub async fn add_user_to_tenant(&self, assignment: &RoleAssignment) -> Result<()> {
        let path = format!("/users/{}/roleRefs", assignment.user_id);
        let role = RoleRef {
            tenant_id: &assignment.tenant_id,
            role_id: &assignment.role_id,
        };
        let options = self.options().with_json(&json!({ "role": role }))?;
        self.send(HttpMethod::Post, &path, options).await?;
        Ok(())
    }

    /// List the roles defined in the deployment.
    pub async fn list_roles(&self) -> Result<Vec<Role>> {
        let response = self
            .send(HttpMethod::Get, "/OS-KSADM/roles", self.options())
            .await?;
        envelope(&response, "roles")
    }

    fn options(&self) -> RequestOptions {
        match self.admin_port {
            Some(port) => RequestOptions::new().with_port(port),
            None => RequestOptions::new(),
        }
    }

    async fn send(
        &self,
        method: HttpMethod,
        path: &str,
        options: RequestOptions,
    ) -> Result<Response> {
        debug!(%method, path, admin_port = ?self.admin_port, "identity request");
        self.connection.req(method, path, options).await
    }

    async fn send_json<B, R>(
        &self,
        method: HttpMethod,
        path: &str,
        body: &B,
        key: &str,
    ) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let options = self.options().with_json(body)?;
        let response = self.send(method, path, options).await?;
        envelope(&response, key)
    }
}

/// Extract and decode `{"<key>": ...}` from a response body.
fn envelope<R: DeserializeOwned>(response: &Response, key: &str) -> Result<R> {
    let mut value: Value = response.json()?;
    let inner = value
        .get_mut(key)
        .map(Value::take)
        .ok_or_else(|| Error::ResponseParse(format!("Response has no `{key}` member")))?;
    Ok(serde_json::from_value(inner)?)
}

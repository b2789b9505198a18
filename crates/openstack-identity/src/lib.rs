//! Identity administration for OpenStack.
//!
//! This crate provides typed models and an asynchronous client for the tenant,
//! user and role resources of the identity (Keystone v2.0) admin API, built on a
//! shared [`openstack_core::Connection`].

#![deny(missing_docs)]

pub mod client;
pub mod models;

pub use client::IdentityClient;
pub use models::{
    CreateTenantRequest, CreateUserRequest, Role, RoleAssignment, Tenant, UpdateUserRequest, User,
};

/// Convenient result alias that reuses the shared OpenStack error type.
pub type Result<T> = openstack_core::Result<T>;

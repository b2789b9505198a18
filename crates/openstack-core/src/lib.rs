//! # openstack-core
//!
//! Authentication, endpoint discovery and request dispatch for OpenStack APIs.
//!
//! A [`Connection`] authenticates against a version 1 or version 2.0 auth
//! service, resolves the endpoint of one service from the returned catalog and
//! then sends authenticated requests to it, reconnecting after transport
//! failures and re-authenticating once when a token expires.
//!
//! ```no_run
//! use openstack_core::{Connection, ConnectionOptions, HttpMethod, RequestOptions};
//!
//! # async fn run() -> openstack_core::Result<()> {
//! let options = ConnectionOptions::new("demo", "secret", "https://identity.example.com:5000/v2.0")
//!     .with_tenant_name("demo")
//!     .with_service_type("compute")
//!     .with_region("RegionOne");
//! let connection = Connection::create(options).await?;
//!
//! let servers = connection
//!     .req(HttpMethod::Get, "/servers", RequestOptions::new())
//!     .await?;
//! println!("{}", servers.text());
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Error taxonomy and fault kinds
//! - [`types`] - Service types and resolved endpoints
//! - [`config`] - Connection options and their checked form
//! - [`client`] - HTTP engine settings and reconnect policy
//! - [`transport`] - Transport seam and the `reqwest` implementation
//! - [`catalog`] - Region-keyed service catalog
//! - [`auth`] - Version 1 and 2.0 authentication strategies
//! - [`session`] - Token and endpoint of an authenticated connection
//! - [`fault`] - Classification of non-2xx responses
//! - [`connection`] - Request dispatcher
//! - [`extensions`] - API extension discovery

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod catalog;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod extensions;
pub mod fault;
pub mod session;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use config::{ConnectionConfig, ConnectionOptions};
pub use connection::{Connection, RequestOptions};
pub use error::{ApiError, Error, FaultKind, Result};
pub use transport::{BodyStream, HttpMethod, RequestBody, Response, StreamingResponse};
pub use types::{Scheme, ServiceEndpoint, ServiceType};

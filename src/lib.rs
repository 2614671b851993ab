//! Keystone-backed authentication and authorization for multi-tenant API servers.
//!
//! The crate is split along the request path:
//! - [`authn`] turns an `Authorization: Basic` header into an identity by checking the
//!   password against Keystone.
//! - [`authz`] decides whether an identity may act inside a namespace, either through a
//!   single [`authz::keystone::KeystoneAuthorizer`] or a [`authz::union::UnionAuthorizer`]
//!   composing several backends.
//! - [`keystone`] holds the collaborator traits and the REST client talking to Keystone.

pub mod authn;
pub mod authz;
pub mod config;
pub mod keystone;
pub mod logs;

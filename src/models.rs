pub mod auth;
pub mod rbac;
pub mod security;
pub mod social;
pub mod user;

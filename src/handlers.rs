pub mod auth;
pub mod permissions;
pub mod roles;
pub mod security;
pub mod social;
pub mod users;

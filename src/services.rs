pub mod auth;
pub mod captcha;
pub mod login_security;
pub mod password;
pub mod permission_service;
pub mod permission_tree;
pub mod rbac_service;
pub mod role_service;
pub mod session;
pub mod social_service;
pub mod user_service;

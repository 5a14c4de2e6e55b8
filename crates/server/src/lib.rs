pub mod auth;
pub mod claims;
pub mod config;
pub mod db;
pub mod directory;
pub mod error_convert;
pub mod health;
pub mod openapi;
pub mod redirects;
pub mod roles;
pub mod router;
pub mod security;
pub mod services;
pub mod telemetry;

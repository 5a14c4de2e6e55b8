pub mod cookies;
pub mod extractors;
pub mod jwt;
pub mod middleware;
pub mod oauth;
pub mod oauth_state;
pub mod routes;
pub mod user;

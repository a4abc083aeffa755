// Library exports for ardu
// Integration tests build the router and state through these modules.

pub mod auth;
pub mod config;
pub mod cron;
pub mod db;
pub mod error;
pub mod extractors;
pub mod lifecycle;
pub mod media;
pub mod otp;
pub mod routes;
pub mod state;

//! routepin: coordinates from Google Maps links.
//!
//! [`location::LinkResolver`] runs the resolution cascade, [`shortlink`]
//! issues and reads share tokens, and [`server`] exposes both over HTTP.

pub mod config;
pub mod location;
pub mod server;
pub mod shortlink;

pub use config::Config;

//! Barbershop - website of a barbershop
//!
//! Service and master catalog, online booking with staff notification,
//! moderated reviews, a blog with comments and user accounts.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod theme;

//! Client library for the NILBx sponsorship marketplace backend.
//!
//! [`api`] holds the generic request engine, [`services`] the typed clients
//! built on it, and [`app`] wires them together from a [`config::Config`].

pub mod api;
pub mod app;
pub mod cache;
pub mod commands;
pub mod config;
pub mod db;
pub mod services;

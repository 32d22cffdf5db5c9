//! Neuron - A multi-author blog with an editorial workflow
//!
//! Authors write drafts and submit them, staff review and publish,
//! readers browse, comment and follow authors.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;

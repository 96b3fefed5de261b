//! Renovation pipeline tracker: keeps a local property store in step with
//! the CRM's free-text "Set Up Status" field.

pub mod board;
pub mod build_info;
pub mod checklist;
pub mod commands;
pub mod config;
pub mod crm;
pub mod error;
pub mod extract;
pub mod model;
pub mod output;
pub mod phase;
pub mod reconcile;
pub mod store;
pub mod sync;

pub mod act;
pub mod aliases;
pub mod board;
pub mod budget;
pub mod checklist;
pub mod create;
pub mod crm;
pub mod delete;
pub mod doctor;
pub mod edit;
pub mod init;
pub mod list;
pub mod log;
pub mod phase;
pub mod reconcile;
pub mod resume;
pub mod show;
pub mod sync;
pub mod tui;

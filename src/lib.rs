pub mod approvals;
pub mod blocker_fsm;
pub mod blockers;
pub mod config;
pub mod daemon;
pub mod db;
pub mod error;
pub mod interfaces;
pub mod logging;
pub mod notifications;
pub mod profiles;
pub mod projects;
pub mod runtime_paths;
pub mod scheduler;
pub mod services;
pub mod stages;
pub mod tasks;

pub type Result<T> = std::result::Result<T, error::ProjectHubError>;

pub mod attendance;
pub mod auth;
pub mod consultations;
pub mod core;
pub mod daily_logs;
pub mod daily_tasks;
pub mod schedules;
pub mod students;

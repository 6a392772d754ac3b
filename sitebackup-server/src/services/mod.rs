pub mod backup_scheduler;
pub mod cpu_monitor;
pub mod launcher;
pub mod mailer;

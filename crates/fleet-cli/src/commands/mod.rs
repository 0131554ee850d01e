pub mod backups;
pub mod config;
pub mod history;
pub mod install;
pub mod nodes;
pub mod rollback;
pub mod status;

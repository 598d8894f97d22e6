pub mod backups;
pub mod init;
pub mod log;
pub mod migrate;
pub mod status;

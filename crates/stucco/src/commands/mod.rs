pub mod init;
pub mod run;
pub mod tasks;
pub mod watch;

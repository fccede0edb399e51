pub mod chat;
pub mod embed;
pub mod init;
pub mod models;
pub mod serve;

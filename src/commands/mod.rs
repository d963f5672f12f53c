pub mod calls;
pub mod config;
pub mod contacts;
pub mod serve;
pub mod sync;
pub mod users;

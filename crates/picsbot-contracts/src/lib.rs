pub mod cache;
pub mod chat;
pub mod phrases;
pub mod providers;

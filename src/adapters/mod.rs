pub mod catalog;
pub mod database;
pub mod messaging;
pub mod settings;

pub mod models;
pub mod profile;
pub mod settings;

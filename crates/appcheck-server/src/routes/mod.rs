pub mod health;
pub mod version;
pub mod webhook;

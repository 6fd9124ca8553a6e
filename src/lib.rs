pub mod assets;
pub mod auth;
pub mod catalog;
pub mod claims;
pub mod config;
pub mod events;
pub mod sheets;
pub mod show;
pub mod tasks {
    pub mod claims;
    pub mod clock;
    pub mod console;
    pub mod orchestrator;
    pub mod presenter;
    pub mod transition;
}

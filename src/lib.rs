pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod geocode;
pub mod metadata;
pub mod selector;
pub mod source;
pub mod tasks {
    pub mod control;
    pub mod driver;
    pub mod watch;
}

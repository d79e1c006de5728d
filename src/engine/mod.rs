// Engine core: media resource cache and breathing session driver.

pub mod cache;
pub mod cues;
pub mod downloader;
pub mod driver;
pub mod session;
pub mod stats;

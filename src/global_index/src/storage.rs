pub mod index;
pub mod location;
pub mod timeline;

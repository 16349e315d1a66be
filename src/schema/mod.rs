// ABOUTME: Table schema handling
// ABOUTME: Descriptor model and the sanitizer that turns it into a creation request

pub mod models;
pub mod sanitize;

pub use models::TableDescriptor;
pub use sanitize::sanitize;

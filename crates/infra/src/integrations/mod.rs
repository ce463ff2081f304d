//! Vendor transport integrations

pub mod document;
pub mod factory;
pub mod rest;

pub use document::DocumentDropAdapter;
pub use factory::DefaultAdapterFactory;
pub use rest::RestVendorAdapter;

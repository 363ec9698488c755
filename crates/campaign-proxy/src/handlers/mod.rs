//! HTTP request handlers for the campaign proxy.

pub mod campaigns;
pub mod health;
pub mod root;

pub use campaigns::get_campaigns;
pub use health::health_check;
pub use root::home;

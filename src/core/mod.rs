pub mod caption;
pub mod data_url;
pub mod gemini;
pub mod hashtags;
pub mod session;
pub mod validation;
pub mod workflow;

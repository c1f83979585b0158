pub mod core;
pub mod documents;
pub mod report;
pub mod session;

pub mod lifecycle;
pub mod resolver;
pub mod service;
pub mod tier;

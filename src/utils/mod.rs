pub mod dns;
pub mod domain;
pub mod patterns;
pub mod provider;
pub mod scoring;
pub mod smtp;

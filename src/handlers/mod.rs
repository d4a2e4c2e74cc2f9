// src/handlers/mod.rs

pub mod admin;
pub mod auth;
pub mod exam;
pub mod question;
pub mod session;
pub mod subject;

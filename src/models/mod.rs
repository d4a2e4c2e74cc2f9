// src/models/mod.rs

pub mod exam;
pub mod question;
pub mod subject;
pub mod submission;
pub mod user;

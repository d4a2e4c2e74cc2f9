// src/services/mod.rs

pub mod question_generator;

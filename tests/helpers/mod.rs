#![allow(dead_code)]

pub mod failing_repo;
pub mod gated_repo;
pub mod mock_config;

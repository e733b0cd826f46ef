pub mod error;
pub mod config;
pub mod registry;
pub mod notify;
pub mod db {
    pub mod models;
    pub mod repository;
    pub mod job_repository;
    pub mod session_repository;
}
pub mod storage {
    pub mod client;
}
pub mod archive {
    pub mod reader;
}
pub mod import {
    pub mod reporting;
    pub mod relationships;
    pub mod documents;
    pub mod attachments;
    pub mod orchestrator;
    pub mod override_pass;
}

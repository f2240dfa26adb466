pub mod auth;
pub mod classifier;
pub mod config;
pub mod db;
pub mod prediction;
pub mod routes;
pub mod storage;
pub mod weather;

pub mod ai;
pub mod auth;
pub mod db;
pub mod models;
pub mod service;

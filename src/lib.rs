pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod game;
pub mod handlers;
pub mod models;
pub mod utils;

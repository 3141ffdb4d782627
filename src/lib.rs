// src/lib.rs

pub mod composer;
pub mod config;
pub mod error;
pub mod feed;
pub mod gateway;
mod likes;
pub mod models;
pub mod repo;
pub mod session;
pub mod storage;
pub mod upload;
pub mod utils;

pub use error::AppError;
pub use session::{Session, SessionProvider};

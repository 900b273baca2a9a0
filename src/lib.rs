pub mod config;
pub mod error;
pub mod faceswap;
pub mod image_processing;
pub mod models;
pub mod openai;
pub mod pipeline;
pub mod selection;
pub mod storage;
pub mod web;

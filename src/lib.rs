pub mod chatbot;
pub mod config;
pub mod provider;

//! Retrieval of passages for the chat-response generator

mod service;

pub use service::RetrievalService;

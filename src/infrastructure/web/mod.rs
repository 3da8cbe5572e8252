//! Brave Search adapter for `domain::ports::web::WebClient`.

pub mod brave_client;

pub use brave_client::BraveWebClient;

//! Linear adapter for `domain::ports::mirror::MirrorClient`, plus webhook
//! signature validation for the ingress process.

pub mod linear_client;
pub mod webhook;

pub use linear_client::LinearMirrorClient;
pub use webhook::verify_signature;

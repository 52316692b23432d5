//! Auto-responder for WhatsApp family groups.
//!
//! Food questions get a short generated reply. Other messages start a
//! standby timer that sends "Jag svarar snart." unless the operator answers
//! within the window.

pub mod bridge;
pub mod classifier;
pub mod config;
pub mod message;
pub mod openai;
pub mod pending;
pub mod reply;
pub mod responder;
pub mod store;
pub mod transport;

#[cfg(test)]
mod testing;

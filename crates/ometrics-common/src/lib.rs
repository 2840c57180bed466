//! Domain types shared by the ometrics agent and server.

pub mod error;
pub mod signing;
pub mod types;

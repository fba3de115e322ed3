//! `Sealgram`: terminal chat client with OpenPGP end-to-end encryption.

pub mod chat;
pub mod config;
pub mod credentials;
pub mod crypto;
pub mod session;
pub mod transport;
pub mod ui;

//! Shared test utilities for the dotsync workspace.
//!
//! A dev-dependency only, never published.
//!
//! - [`home`]: [`TestHome`] with a source and a target directory on disk
//! - [`counting`]: [`CountingSystem`], a backend decorator that counts
//!   mutations

pub mod counting;
pub mod home;

pub use counting::CountingSystem;
pub use home::TestHome;

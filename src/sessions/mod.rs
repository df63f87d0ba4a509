//! Onboarding sessions — whether we know a user's name yet.

pub mod directory;
pub mod state;

pub use directory::{InMemorySessionDirectory, SessionDirectory};
pub use state::{Session, SessionPhase};

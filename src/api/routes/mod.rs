//! API route modules.

pub mod meetings;
pub mod participants;
pub mod transcribe;

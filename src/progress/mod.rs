//! Rate limiting for user-visible progress messages.

pub mod throttle;

pub use throttle::ProgressThrottle;

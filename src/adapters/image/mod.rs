//! Image generation adapters.

mod mock;

pub use mock::MockImageGenerator;

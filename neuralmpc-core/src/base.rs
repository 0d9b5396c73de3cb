//! Environment interface and spaces.
mod env;
mod space;
mod step;
pub use env::Env;
pub use space::BoxSpace;
pub use step::Step;

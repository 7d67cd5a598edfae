pub mod histogram;
pub mod measurement;
pub mod validator;

pub use histogram::RttHistogram;
pub use measurement::Measurement;
pub use validator::{AfCapabilityValidator, ResultValidator};

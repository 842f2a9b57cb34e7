pub mod mocks;

pub use mocks::{ChannelBackend, DeniedBackend, MockEngine};

//! Business components exposed by the server.

mod random;

pub use random::RandomService;

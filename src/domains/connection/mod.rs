pub mod types;

pub use types::ConnectionDescriptor;

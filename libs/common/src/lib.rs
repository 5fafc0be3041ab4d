pub mod id;
pub mod topic;

pub use id::prefixed_ulid;

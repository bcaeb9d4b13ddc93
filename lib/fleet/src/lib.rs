pub mod location;
pub mod topic;

pub mod agent;
pub mod catalogue;
pub mod tooling;

pub mod connectors;
pub mod worker;

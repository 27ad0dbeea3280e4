// HTTP layer: one handler module per service, plus the reqwest clients
// the services use to talk to each other.

pub mod chain;
pub mod clients;
pub mod miner;
pub mod transaction;
pub mod wallet;

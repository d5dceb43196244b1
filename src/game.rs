pub mod connection;
pub mod manager;
pub mod matchmaker;
pub mod round;
pub mod scoring;
pub mod spectator;
pub mod state;
pub mod store;
pub mod validator;

pub use manager::GameManager;
pub use matchmaker::JoinQueueResult;
pub use validator::GuessOutcome;

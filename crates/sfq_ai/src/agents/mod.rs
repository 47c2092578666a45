pub mod answering;
pub mod risk;
pub mod verification;

pub use answering::{AnswerPass, AnsweringAgent};
pub use risk::RiskAgent;
pub use verification::VerificationAgent;

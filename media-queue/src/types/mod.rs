pub mod envelope;
pub mod ids;

pub use envelope::{EventEnvelope, PublishReceipt};
pub use ids::MessageId;

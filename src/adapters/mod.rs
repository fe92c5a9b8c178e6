// Concrete collaborators behind the domain ports: HTTP providers and the local store.

pub mod memory;
pub mod openai;
pub mod sendgrid;

pub use memory::MemoryStore;
pub use openai::OpenAiClient;
pub use sendgrid::SendGridClient;

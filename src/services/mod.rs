// src/services/mod.rs
pub mod compositor;
pub mod judge;
pub mod orchestrator;
pub mod pexels;
pub mod prediction;
pub mod session;

pub use compositor::Compositor;
pub use judge::JudgeService;
pub use orchestrator::Orchestrator;
pub use pexels::PexelsClient;
pub use prediction::ReplicateClient;
pub use session::SessionStore;

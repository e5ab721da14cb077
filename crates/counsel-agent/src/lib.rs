pub mod http;
pub mod ollama;
pub mod vertex;

pub use ollama::OllamaBackend;
pub use vertex::VertexBackend;

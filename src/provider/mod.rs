pub mod mock;
pub mod openai_compat;
pub mod traits;

pub use mock::{MockBackend, MockReply};
pub use openai_compat::OpenAiCompatBackend;
pub use traits::*;

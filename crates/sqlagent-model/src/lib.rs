//! LLM model implementations
//!
//! An OpenAI-compatible chat client with tool calling (Groq by default), the
//! static model catalog offered to users, and `init_llm` to build a model
//! from a selected identifier.

pub mod catalog;
pub mod factory;
pub mod openai;
pub mod types;

pub use catalog::{fetch_remote_models, get_llm_list, model_id_from_selection, MODEL_LIST};
pub use factory::{init_llm, Provider};
pub use openai::OpenAIModel;
pub use types::*;

//! System prompts used by model-backed routing

mod supervisor;

pub use supervisor::{render_supervisor_prompt, SUPERVISOR_PROMPT};

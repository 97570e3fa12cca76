pub mod prompt;

pub use prompt::{ load_prompts, PromptTemplates };

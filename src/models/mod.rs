pub mod openai;

use crate::error::GenerationError;

/// A hosted text-generation capability. Output content is free text and may
/// differ between calls with identical input when `temperature > 0`.
pub trait GenerationClient {
    fn generate(&self, prompt: &str, temperature: f32) -> Result<String, GenerationError>;

    fn model_id(&self) -> &str;
}

impl<T: GenerationClient + ?Sized> GenerationClient for &T {
    fn generate(&self, prompt: &str, temperature: f32) -> Result<String, GenerationError> {
        (**self).generate(prompt, temperature)
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

impl<T: GenerationClient + ?Sized> GenerationClient for Box<T> {
    fn generate(&self, prompt: &str, temperature: f32) -> Result<String, GenerationError> {
        (**self).generate(prompt, temperature)
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

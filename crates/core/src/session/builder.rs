use std::time::Duration;

use data_assistant_model::{GenerationParams, ModelProvider};

use super::Session;
use crate::model_client::ModelClient;

/// [`Session`] builder.
pub struct SessionBuilder {
    pub(crate) model_client: ModelClient,
    pub(crate) system_instruction: Option<String>,
    pub(crate) params: GenerationParams,
    pub(crate) request_timeout: Option<Duration>,
}

impl SessionBuilder {
    /// Creates a new builder with the specified model provider.
    #[inline]
    pub fn with_model_provider<P: ModelProvider + 'static>(
        provider: P,
    ) -> Self {
        Self {
            model_client: ModelClient::new(provider),
            system_instruction: None,
            params: GenerationParams::default(),
            request_timeout: None,
        }
    }

    /// Sets the instruction sent ahead of the conversation in every request.
    #[inline]
    pub fn with_system_instruction<S: Into<String>>(
        mut self,
        instruction: S,
    ) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    /// Sets the sampling parameters.
    #[inline]
    pub fn with_generation_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    /// Limits how long a single request may take. `None` waits forever.
    #[inline]
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Builds the session.
    #[inline]
    pub fn build(self) -> Session {
        Session::from_builder(self)
    }
}

//! services/api/src/adapters/chat_llm.rs
//!
//! This module contains the adapter for the director's assistant chat model.
//! It implements the `ChatService` port from the `core` crate, talking to the
//! gateway's OpenAI-compatible chat completions endpoint.

use crate::adapters::{credentials::ApiKeySlot, gemini::classify_message};
use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use storyboard_core::{
    domain::{ChatMessage, ChatRole},
    ports::{ChatService, PortError, PortResult},
};

/// System prompt for every conversation.
const DIRECTOR_PERSONA: &str = "You are an expert film director and storyboard consultant. Help the user refine their script, visualize their scenes, and give advice on cinematography, lighting, and pacing.";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `ChatService` using an OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct OpenAiChatAdapter {
    api_base: String,
    api_key: ApiKeySlot,
    model: String,
}

impl OpenAiChatAdapter {
    /// Creates a new `OpenAiChatAdapter`.
    ///
    /// `api_base` is the OpenAI-compatible root, e.g.
    /// `https://generativelanguage.googleapis.com/v1beta/openai`.
    pub fn new(api_base: String, api_key: ApiKeySlot, model: String) -> Self {
        Self {
            api_base,
            api_key,
            model,
        }
    }

    /// Builds a client for this call only, so the latest selected key is used.
    fn client(&self) -> PortResult<Client<OpenAIConfig>> {
        let config = OpenAIConfig::new()
            .with_api_base(self.api_base.clone())
            .with_api_key(self.api_key.require()?);
        Ok(Client::with_config(config))
    }

    fn build_messages(
        history: &[ChatMessage],
        message: &str,
    ) -> PortResult<Vec<ChatCompletionRequestMessage>> {
        let mut messages: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(history.len() + 2);
        messages.push(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(DIRECTOR_PERSONA)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        );

        for turn in history {
            let mapped: ChatCompletionRequestMessage = match turn.role {
                ChatRole::User => ChatCompletionRequestUserMessageArgs::default()
                    .content(turn.text.clone())
                    .build()
                    .map_err(|e| PortError::Unexpected(e.to_string()))?
                    .into(),
                ChatRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(turn.text.clone())
                    .build()
                    .map_err(|e| PortError::Unexpected(e.to_string()))?
                    .into(),
            };
            messages.push(mapped);
        }

        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(message)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        );
        Ok(messages)
    }
}

//=========================================================================================
// `ChatService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ChatService for OpenAiChatAdapter {
    /// Sends the whole conversation plus the new message and returns the reply text.
    async fn reply(&self, history: &[ChatMessage], message: &str) -> PortResult<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(Self::build_messages(history, message)?)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // The compatibility layer only reports the failure in its message text.
        let response = self
            .client()?
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| classify_message(e.to_string()))?;

        Ok(response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default())
    }
}

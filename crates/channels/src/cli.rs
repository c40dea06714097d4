//! CLI channel — prints outbound replies to the terminal.
//!
//! Inbound input comes through the interactive front-end, not a poll, so
//! `receive` always yields nothing.

use async_trait::async_trait;
use switchboard_core::{Channel, ChannelError, InboundMessage};

const MAX_TEXT_LENGTH: usize = 4000;

/// The terminal channel.
pub struct CliChannel;

impl CliChannel {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn id(&self) -> &str {
        "cli"
    }

    fn max_text_length(&self) -> usize {
        MAX_TEXT_LENGTH
    }

    async fn receive(&self) -> Result<Option<InboundMessage>, ChannelError> {
        Ok(None)
    }

    async fn send(
        &self,
        _recipient: &str,
        text: &str,
        _thread_id: Option<&str>,
    ) -> Result<(), ChannelError> {
        println!("{text}");
        Ok(())
    }
}

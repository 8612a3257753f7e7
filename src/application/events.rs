use crate::domain::events::KernelEvent;
use crate::domain::ports::EventHandler;
use crate::error::{KernelError, Result};
use tracing::debug;

/// Routes kernel events to the handlers that declared the matching kind.
#[derive(Default)]
pub struct EventBus {
    handlers: Vec<Box<dyn EventHandler>>,
    history: Vec<KernelEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler. A handler that declares no capability is a
    /// protocol violation.
    pub fn subscribe(&mut self, handler: Box<dyn EventHandler>) -> Result<()> {
        if handler.capabilities().is_empty() {
            return Err(KernelError::ProtocolViolation {
                collaborator: handler.name().to_string(),
                capability: "at least one event kind".to_string(),
            });
        }
        self.handlers.push(handler);
        Ok(())
    }

    pub fn publish(&mut self, event: KernelEvent) {
        let kind = event.kind();
        for handler in self
            .handlers
            .iter_mut()
            .filter(|h| h.capabilities().contains(&kind))
        {
            debug!(handler = handler.name(), ?kind, "dispatching event");
            handler.handle(&event);
        }
        self.history.push(event);
    }

    /// Every event published so far, in order.
    pub fn history(&self) -> &[KernelEvent] {
        &self.history
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

// ============================================================================
// Interfaces Module
// Contracts for the engine's external collaborators
// ============================================================================

mod event_handler;

pub use event_handler::{
    CollectingEventHandler, EngineEvent, EventHandler, LoggingEventHandler, NoOpEventHandler,
};

//! rms: the assistant side of the RMS chat protocol
//!
//! This crate holds everything between the backend socket and the page:
//!
//! * [`dom`] - a parsed page with form state and event listeners
//! * [`resolver`] - symbolic element targets to concrete elements
//! * [`executor`] - the browser automation primitives
//! * [`context`] - site classification, extraction and change detection
//! * [`conversation`] - message log, tool invocations, cards, persistence
//! * [`dispatcher`] - inbound frame handling
//! * [`session`] - one assistant lifetime tying the above together
//!
//! # Example
//!
//! ```ignore
//! use std::rc::Rc;
//! use rms::{AssistantSession, Conversation, SessionConfig, StaticHost};
//! use rms_runtime::{Transport, TransportConfig};
//!
//! let (transport, handle, mut events) = Transport::new(TransportConfig::default());
//! tokio::task::spawn_local(transport.run());
//!
//! let host = Rc::new(StaticHost::new());
//! host.open_tab("https://app.close.com/lead/lead_1/", &markup);
//! let mut session = AssistantSession::new(host, Rc::new(handle), Conversation::new(), SessionConfig::default());
//! session.send_message("Find LDJ Trucking").await?;
//! ```

pub mod context;
pub mod conversation;
pub mod dispatcher;
pub mod dom;
pub mod error;
pub mod executor;
pub mod host;
pub mod resolver;
pub mod session;

pub use context::{ContextUpdate, ContextWatcher, PageSignal, WatcherConfig, extract};
pub use conversation::{AuxiliaryCard, Conversation, Message, PendingAction, Role, Streaming, ToolInvocation, ToolStatus};
pub use dispatcher::{Dispatcher, UiEvent, summarize_result};
pub use dom::{Document, EventKind};
pub use error::{Error, Result};
pub use executor::{ActionExecutor, AutomationConfig};
pub use host::{BrowserHost, StaticHost};
pub use resolver::{Resolution, STRATEGIES, Strategy, resolve};
pub use session::{AssistantSession, SessionConfig, quote_data};

//! # Nightwatch
//!
//! Client session layer for a networked werewolf game.
//!
//! Nightwatch keeps one framed TCP connection to the game server alive and
//! follows the server through the night: seer, guard, and wolf sub-phases,
//! each with a deadline every view agrees on. Duplicate or late phase
//! signals are absorbed, a silent link is detected and recovered with
//! exponential backoff, and after a reconnect the night picks up exactly
//! where the server says it is.
//!
//! The embedding application implements [`Presenter`] to draw what
//! happens, and drives a [`Client`] from its event loop.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nightwatch::prelude::*;
//!
//! // Implement Presenter for your UI, then:
//! // let mut client = ClientBuilder::new()
//! //     .local_user("ann")
//! //     .build_tcp(MyPresenter);
//! // client.connect(Endpoint::new("127.0.0.1", 5000)).await?;
//! // client.run(shutdown_signal).await
//! ```

mod client;
mod config;
mod error;
mod presenter;

pub use client::{Client, ClientBuilder, SessionInfo};
pub use config::ClientConfig;
pub use error::NightwatchError;
pub use presenter::{NullPresenter, Presenter, ReconnectChoice};

pub use nightwatch_night as night;
pub use nightwatch_protocol as protocol;
pub use nightwatch_session as session;
pub use nightwatch_tick as tick;
pub use nightwatch_transport as transport;

/// Everything an embedding application usually needs.
pub mod prelude {
    pub use crate::{
        Client, ClientBuilder, ClientConfig, NightwatchError, Presenter,
        ReconnectChoice, SessionInfo,
    };
    pub use nightwatch_night::{ActionOutcome, NightState, Phase, RoleView};
    pub use nightwatch_protocol::{
        ActionKind, MessageType, NightResolution, Payload, Role, RoomId,
    };
    pub use nightwatch_tick::{Clock, SystemClock};
    pub use nightwatch_transport::{ConnectionState, Endpoint};
}

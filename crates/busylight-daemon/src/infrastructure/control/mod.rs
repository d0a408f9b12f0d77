//! WebSocket control surface.
//!
//! A thin caller of the [`ServiceHandle`](crate::application::service::ServiceHandle)
//! API: each JSON text frame is decoded into a [`ControlRequest`], dispatched,
//! and answered with exactly one [`ControlReply`].

pub mod messages;
pub mod ws_server;

pub use messages::{dispatch, ControlReply, ControlRequest};
pub use ws_server::{bind_listener, run_server, serve};

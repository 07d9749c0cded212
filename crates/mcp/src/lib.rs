//! C5 Approval Rendezvous — the in-process MCP server half.
//!
//! Exposes exactly one permission-prompt tool over streamable HTTP, one
//! instance per running session. The synchronous half of the rendezvous (the
//! Pending Approval map, the oneshot decision channel) lives in the gateway
//! and is reached through [`PermissionCore`].

mod server;

pub use server::{serve_session, PermissionCore, PermissionMcpServer};

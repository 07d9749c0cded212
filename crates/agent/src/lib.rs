//! C3 Agent Process — spawns and supervises the agent CLI subprocess that
//! backs one chat session, and parses its JSON-Lines stdout contract.

pub mod process;

pub use process::{
    AgentEvent, AgentProcess, AgentProcessError, McpConfigDocument, McpServerEntry, SpawnParams,
};

//! Remote management agent for dynamically reconfigurable component runtimes.

pub mod adapters;
pub mod agent;
pub mod capability;
pub mod cli;
pub mod commands;
pub mod config;
pub mod controller;
pub mod descriptor;
pub mod dto;
pub mod extensions;
pub mod host;
pub mod install;
pub mod lifecycle;
pub mod push;
pub mod redirector;
pub mod router;
pub mod system_command;
pub mod values;

pub use agent::AgentServer;

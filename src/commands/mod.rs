// commands/mod.rs - Command Module Registry
// This file declares all command modules and provides a centralized registry
// for all bot commands, making them easily accessible from main.rs

pub mod gate;       // Capability checks evaluated before command dispatch
pub mod help;       // Help system and command documentation
pub mod moderation; // Member moderation (kick, ban, softban, nickname, block)
pub mod ping;       // Basic ping/pong functionality
pub mod purge;      // Bulk message cleanup pipeline and filters
pub mod weather;    // Weather lookups and saved locations

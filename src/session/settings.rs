//! Settings accumulated by a session between commands.

use serde_json::Value;

use crate::session::command::{MappingsCommand, SettingsCommand};

/// Settings bag forwarded with every `convert` request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSettings {
    /// World (NBT) settings.
    pub world_settings: Option<Value>,
    /// Dimension pruning list.
    pub pruning_settings: Option<Value>,
    /// Input-to-output dimension remap.
    pub dimension_mappings: Option<Value>,
    /// Block mappings.
    pub block_mappings: Option<Value>,
    /// Requested output name, unsanitized.
    pub output_name: Option<String>,
}

impl SessionSettings {
    /// Apply a settings update.
    pub fn apply_settings(&mut self, command: SettingsCommand) {
        match command {
            SettingsCommand::SetWorldSettings { settings, .. } => self.world_settings = settings,
            SettingsCommand::SetPruningSettings { settings, .. } => self.pruning_settings = settings,
            SettingsCommand::SetOutputName { name, .. } => self.output_name = name,
        }
    }

    /// Apply a mappings update.
    pub fn apply_mappings(&mut self, command: MappingsCommand) {
        match command {
            MappingsCommand::SetBlockMappings { mappings, .. } => self.block_mappings = mappings,
            MappingsCommand::SetDimensionMappings { dimensions, .. } => {
                self.dimension_mappings = dimensions;
            }
        }
    }
}

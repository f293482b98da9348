use crate::ir_emitter::IrEmitter;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use stmtir_lower::LoweredFunction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn render(self, functions: &[LoweredFunction], emitter: &IrEmitter) -> Result<String> {
        match self {
            OutputFormat::Text => emitter.emit_functions_to_string(functions),
            OutputFormat::Json => {
                let mut json = serde_json::to_string_pretty(functions)?;
                json.push('\n');
                Ok(json)
            }
        }
    }
}

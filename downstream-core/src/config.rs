//! Engine configuration.

use serde::Deserialize;

/// Settings for an [`Engine`](crate::Engine).
///
/// Deserializable so hosts can keep it next to their own settings:
///
/// ```rust,ignore
/// let config: EngineConfig = serde_json::from_str(r#"{ "name": "ui" }"#)?;
/// let engine = Engine::with_config(config);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Name attached to the engine's log events.
    pub name: String,

    /// How deeply writes issued from listeners or evaluation functions may
    /// nest. The outermost `set` counts as depth 1.
    pub max_tick_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "downstream".to_string(),
            max_tick_depth: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_missing_fields() {
        let config: EngineConfig = serde_json::from_str(r#"{ "name": "ui" }"#).unwrap();
        assert_eq!(config.name, "ui");
        assert_eq!(config.max_tick_depth, EngineConfig::default().max_tick_depth);
    }

    #[test]
    fn empty_document_is_default() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
    }
}

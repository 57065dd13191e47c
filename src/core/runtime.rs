//! Handler runtime classification.

use serde::{Deserialize, Serialize};

/// Runtime family of a handler entry point.
///
/// The orchestrator only distinguishes the three build models:
/// node-like (incremental bundler), go-like (compiler with a concurrency
/// cap and a coarse dependency model), python-like (no build step).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    Node,
    Go,
    Python,
}

impl RuntimeKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Go => "go",
            Self::Python => "python",
        }
    }

    /// Detect the runtime from the handler string when the config omits it.
    ///
    /// - `dir/file.go` or a bare directory → go
    /// - `dir/file.symbol` → node (python must be declared explicitly,
    ///   the handler shape is identical)
    pub fn detect(handler: &str) -> Self {
        let last = handler.rsplit('/').next().unwrap_or(handler);
        if last.ends_with(".go") || !last.contains('.') {
            Self::Go
        } else {
            Self::Node
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_go_file() {
        assert_eq!(RuntimeKind::detect("handlers/get.go"), RuntimeKind::Go);
    }

    #[test]
    fn test_detect_go_directory() {
        assert_eq!(RuntimeKind::detect("cmd/server"), RuntimeKind::Go);
    }

    #[test]
    fn test_detect_node() {
        assert_eq!(RuntimeKind::detect("src/api.handler"), RuntimeKind::Node);
    }

    #[test]
    fn test_serde_lowercase() {
        let kind: RuntimeKind = serde_json::from_str("\"python\"").unwrap();
        assert_eq!(kind, RuntimeKind::Python);
    }
}

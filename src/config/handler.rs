//! `[[handlers]]` section configuration.
//!
//! Each table declares one deployable function unit:
//!
//! ```toml
//! [[handlers]]
//! src_path = "services"          # directory relative to the app root
//! handler = "src/api.handler"    # dir/file.symbol (node/python) or dir/file.go
//! runtime = "node"               # optional, detected from handler shape
//! bundle = true                  # node only: bundle dependencies
//! ```

use serde::Deserialize;

use crate::core::RuntimeKind;

/// One handler entry point.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandlerConfig {
    /// Source directory relative to the app root.
    pub src_path: String,

    /// Handler path: `dir/file.symbol` for node/python,
    /// `dir/file.go` or a directory for go.
    pub handler: String,

    /// Runtime family. Detected from the handler string when omitted.
    #[serde(default)]
    pub runtime: Option<RuntimeKind>,

    /// Bundle dependencies into the artifact (node only).
    #[serde(default = "default_bundle")]
    pub bundle: bool,
}

fn default_bundle() -> bool {
    true
}

impl HandlerConfig {
    /// Fill in the detected runtime when the config omitted it.
    pub fn normalize(&mut self) {
        if self.runtime.is_none() {
            self.runtime = Some(RuntimeKind::detect(&self.handler));
        }
    }

    /// Resolved runtime. Call after `normalize()`.
    pub fn runtime(&self) -> RuntimeKind {
        self.runtime
            .unwrap_or_else(|| RuntimeKind::detect(&self.handler))
    }
}

//! Per-source-directory record.
//!
//! A source path groups the entry points sharing lint and type-check
//! configuration. The record is created on the first successful build of
//! any of its entry points.

use std::path::PathBuf;

use crate::watcher::checks::CheckerHandle;

pub(crate) struct SourcePath {
    pub src_path: String,
    /// `tsconfig.json` shared by this source path's entry points.
    pub tsconfig: Option<PathBuf>,
    /// A build succeeded since the last checker launch.
    pub needs_recheck: bool,
    /// Live lint process, at most one.
    pub lint: Option<CheckerHandle>,
    /// Live type-check process, at most one.
    pub typecheck: Option<CheckerHandle>,
}

impl SourcePath {
    pub fn new(src_path: String, tsconfig: Option<PathBuf>) -> Self {
        Self {
            src_path,
            tsconfig,
            needs_recheck: false,
            lint: None,
            typecheck: None,
        }
    }

    /// Cooperatively kill both checker processes. The handles stay in
    /// place until the children report exit.
    pub fn kill_checkers(&mut self) {
        if let Some(lint) = &mut self.lint {
            lint.kill();
        }
        if let Some(typecheck) = &mut self.typecheck {
            typecheck.kill();
        }
    }

    pub fn has_live_checker(&self) -> bool {
        self.lint.is_some() || self.typecheck.is_some()
    }
}

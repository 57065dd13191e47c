//! Python-like handlers have no build step.
//!
//! The "build" is a synchronous success pointing at the source tree, with
//! an empty input set: python entry points never participate in
//! file-change driven rebuilds.

use rustc_hash::FxHashSet;

use super::{BuildOutput, BuildRequest, BuiltArtifact};

pub(super) fn build(req: &BuildRequest) -> BuildOutput {
    let (file_part, symbol) = req.split_handler();

    BuildOutput {
        artifact: BuiltArtifact {
            entry_file: req.src_dir.join(format!("{file_part}.py")),
            handler_symbol: symbol.to_string(),
            out_dir: req.src_dir.clone(),
            source_path: req.handler.clone(),
        },
        input_files: FxHashSet::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RuntimeKind;
    use std::path::PathBuf;

    #[test]
    fn test_python_build_points_at_source() {
        let req = BuildRequest {
            key: "etl|jobs/ingest.main".into(),
            runtime: RuntimeKind::Python,
            src_dir: PathBuf::from("/app/etl"),
            handler: "jobs/ingest.main".into(),
            bundle: false,
            out_dir: PathBuf::from("/app/.strato/handlers/x"),
            app_path: PathBuf::from("/app"),
        };

        let output = build(&req);
        assert_eq!(
            output.artifact.entry_file,
            PathBuf::from("/app/etl/jobs/ingest.py")
        );
        assert_eq!(output.artifact.handler_symbol, "main");
        assert!(output.input_files.is_empty());
    }
}

//! Context artifact emission

use crate::context_json::ContextGenerator;
use crate::error::{Error, Result};
use crate::ir::Program;
use crate::pass::{Emitter, PassContext};

/// Writes the context JSON when a destination is configured.
///
/// Failing to write is recorded in [`crate::pass::Artifacts::io_errors`];
/// it is not a diagnostic and does not abort compilation. The rendered text
/// is kept in [`crate::pass::Artifacts::context_json`] either way.
pub struct EmitContextArtifact;

impl Emitter<Program> for EmitContextArtifact {
    fn name(&self) -> &'static str {
        "EmitContextArtifact"
    }

    fn emit(&mut self, _program: &Program, cx: &mut PassContext<'_>) -> Result<()> {
        let Some(path) = cx.options.context_file.as_ref() else {
            tracing::debug!("no context file configured");
            return Ok(());
        };
        let json = ContextGenerator::new(cx.options)
            .generate(cx.structure, chrono::Utc::now())
            .to_pretty_json()?;
        if let Err(err) = std::fs::write(path, &json) {
            let err = Error::io(path, &err);
            tracing::error!(path = %path.display(), error = %err, "cannot write context artifact");
            cx.artifacts.io_errors.push(err);
        } else {
            tracing::debug!(path = %path.display(), bytes = json.len(), "context artifact written");
        }
        cx.artifacts.context_json = Some(json);
        Ok(())
    }
}

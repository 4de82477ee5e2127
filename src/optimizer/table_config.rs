//! Table configuration text
//!
//! One line per const entry, in the form the target's control-plane CLI
//! loads:
//!
//! ```text
//! match 0xa000000/0xff000000 0x6 action set_port port 0x1 priority 10
//! ```
//!
//! Table, action and parameter names are the shortened ones.

use crate::asm::{AsmProgram, AsmTable};
use crate::error::{Error, Result};
use crate::pass::{PassContext, Rewrite};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Text for one table, `None` when it has no const entries
pub fn table_config(table: &AsmTable) -> Option<String> {
    if table.entries.is_empty() {
        return None;
    }
    let mut text = String::new();
    for entry in &table.entries {
        text.push_str("match");
        for key in &entry.keys {
            let _ = write!(text, " {}", key);
        }
        let _ = write!(text, " action {}", entry.action);
        for (param, value) in &entry.args {
            let _ = write!(text, " {} 0x{:x}", param, value);
        }
        if let Some(priority) = entry.priority {
            let _ = write!(text, " priority {}", priority);
        }
        text.push('\n');
    }
    Some(text)
}

/// Renders and writes table configurations after renaming
pub struct EmitDpdkTableConfig;

impl Rewrite<AsmProgram, BTreeMap<String, String>> for EmitDpdkTableConfig {
    fn name(&self) -> &'static str {
        "EmitDpdkTableConfig"
    }

    fn rewrite(
        &mut self,
        program: AsmProgram,
        _renames: &BTreeMap<String, String>,
        cx: &mut PassContext<'_>,
    ) -> Result<AsmProgram> {
        for table in &program.tables {
            let Some(text) = table_config(table) else {
                continue;
            };
            if let Some(dir) = &cx.options.table_config_dir {
                let path = dir.join(format!("{}.txt", table.name));
                if let Err(err) = std::fs::write(&path, &text) {
                    let err = Error::io(&path, &err);
                    tracing::error!(path = %path.display(), error = %err, "cannot write table configuration");
                    cx.artifacts.io_errors.push(err);
                }
            }
            cx.artifacts.table_configs.insert(table.name.clone(), text);
        }
        Ok(program)
    }
}

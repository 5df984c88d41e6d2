//! Template synthesis command.

use std::path::Path;

use anyhow::{Result, bail};
use tracing::warn;

use super::declare;

/// Synthesize the stack, printing the template or writing it to `output`.
pub fn synth(config: Option<&Path>, output: Option<&Path>, strict: bool) -> Result<()> {
    let declared = declare(config)?;
    let stack = declared.stack()?;

    let report = stack.audit_authorization();
    for gap in &report.gaps {
        warn!(
            principal = %gap.principal,
            action = %gap.action,
            resource = %gap.resource,
            purpose = %gap.purpose,
            "Authorization gap"
        );
    }
    if strict && !report.is_authorized() {
        bail!(
            "{} authorization gap(s) in stack '{}'",
            report.gaps.len(),
            stack.name()
        );
    }

    match output {
        Some(dir) => {
            for path in declared.app.synth()?.write_to(dir)? {
                println!("{}", path.display());
            }
        }
        None => {
            println!("{}", stack.synth()?.to_json_pretty()?);
        }
    }

    Ok(())
}

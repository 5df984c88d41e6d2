//! Graph and audit reporting commands.

use std::path::Path;

use anyhow::Result;

use super::declare;

/// Print resources in creation order, then grouped into waves.
pub fn graph(config: Option<&Path>) -> Result<()> {
    let declared = declare(config)?;
    let graph = declared.stack()?.dependency_graph()?;

    println!("Creation order:");
    for (index, id) in graph.creation_order()?.iter().enumerate() {
        let deps = graph.dependencies_of(id);
        if deps.is_empty() {
            println!("  {:>2}. {}", index + 1, id);
        } else {
            let deps: Vec<String> = deps.iter().map(ToString::to_string).collect();
            println!("  {:>2}. {} (after {})", index + 1, id, deps.join(", "));
        }
    }

    println!("\nWaves:");
    for (index, wave) in graph.waves()?.iter().enumerate() {
        let ids: Vec<String> = wave.iter().map(ToString::to_string).collect();
        println!("  {}: {}", index + 1, ids.join(", "));
    }

    Ok(())
}

/// Print the authorization report per principal.
pub fn audit(config: Option<&Path>) -> Result<()> {
    let declared = declare(config)?;
    let stack = declared.stack()?;
    let report = stack.audit_authorization();

    let mut principals: Vec<_> = stack.requirements().iter().map(|r| &r.principal).collect();
    principals.sort();
    principals.dedup();

    for principal in principals {
        let gaps = report.gaps_for(principal);
        if gaps.is_empty() {
            println!("✓ {}", principal);
        } else {
            println!("✗ {}", principal);
            for gap in gaps {
                println!("    {} on {} ({})", gap.action, gap.resource, gap.purpose);
            }
        }
    }

    println!(
        "\n{} checks, {} gap(s)",
        report.checked,
        report.gaps.len()
    );
    Ok(())
}

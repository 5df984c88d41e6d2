//! Local walk through the pipeline's stage state machine.

use std::path::Path;

use anyhow::{Result, bail};
use pipestack_core::execution::{ExecutionStatus, PipelineExecution, StageOutcome};

use super::declare;

/// Run each stage in order, failing `fail` if given.
pub fn simulate(config: Option<&Path>, fail: Option<&str>) -> Result<()> {
    let declared = declare(config)?;
    let pipeline = &declared.delivery.pipeline;
    let stage_names = pipeline.stage_names();

    if let Some(fail) = fail {
        if !stage_names.contains(&fail) {
            bail!("Pipeline has no stage named '{}': {:?}", fail, stage_names);
        }
    }

    println!(
        "Simulating pipeline: {}",
        pipeline.pipeline_name().unwrap_or(pipeline.logical_id().as_str())
    );
    println!("\n--- Starting pipeline execution ---\n");

    let mut execution = PipelineExecution::for_pipeline(pipeline);
    let status = execution.run_with(|stage| {
        println!("▶ Stage '{}' started", stage);
        if Some(stage) == fail {
            println!("✗ Stage '{}' failed\n", stage);
            StageOutcome::Failed("simulated failure".to_string())
        } else {
            println!("✓ Stage '{}' completed successfully\n", stage);
            StageOutcome::Succeeded
        }
    })?;

    println!("--- Stage Summary ---");
    for (name, state) in execution.stages() {
        println!("  {} - {}", name, state);
    }

    if status == ExecutionStatus::Succeeded {
        println!("\n✓ Pipeline succeeded!");
        Ok(())
    } else {
        println!("\n✗ Pipeline {}", status);
        std::process::exit(1);
    }
}

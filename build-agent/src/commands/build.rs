use crate::config::QueueArgs;
use crate::output;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use color_eyre::Result;

use build_pipeline::pipeline::{LogLevel, StepStatus};
use build_pipeline::{
    progress_channel, BuildEvent, BuildStatus, CancelSignal, ConfigResolver, PipelineRunner,
    StageStatus, StepRegistry,
};

/// Run one build locally in the foreground
#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Project document (YAML for .yaml/.yml, JSON otherwise)
    pub project: PathBuf,

    /// Target to build (defaults to the first target)
    #[arg(long, short, value_name = "TARGET")]
    pub target: Option<String>,

    #[command(flatten)]
    pub queue: QueueArgs,
}

pub async fn execute(args: BuildArgs) -> Result<()> {
    if !args.project.exists() {
        color_eyre::eyre::bail!("Project file not found: {}", args.project.display());
    }

    let registry = Arc::new(StepRegistry::with_builtin_modules());
    output::status("Loading", &format!("{}", args.project.display()));
    let project = ConfigResolver::new(&registry)
        .load_file(&args.project)
        .map_err(|e| color_eyre::eyre::eyre!("{}", e))?;

    output::info(&format!(
        "Project '{}': {} target(s)",
        project.project_name,
        project.targets.len()
    ));

    let (tx, mut rx) = progress_channel();
    let runner = PipelineRunner::new(registry).with_progress(tx);
    let output_root = args.queue.output_root();
    let target = args.target;

    let cancel = CancelSignal::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            output::warning("Interrupted, stopping at the next step boundary");
            on_interrupt.cancel();
        }
    });

    // Run in the background, report progress in the foreground
    let run_handle = tokio::spawn(async move {
        runner
            .run(&project, target.as_deref(), &output_root, &cancel)
            .await
    });

    while let Some(event) = rx.recv().await {
        print_event(&event);
    }

    let run = run_handle.await??;
    if let Some(error) = &run.error {
        output::error(error);
    }
    if run.status != BuildStatus::Succeeded {
        std::process::exit(1);
    }

    Ok(())
}

fn print_event(event: &BuildEvent) {
    match event {
        BuildEvent::BuildQueued { .. } => {}

        BuildEvent::BuildStarted {
            project_name,
            target_name,
        } => {
            println!();
            output::header(&format!("Building '{}' target '{}'", project_name, target_name));
        }

        BuildEvent::BuildCompleted {
            status, duration, ..
        } => {
            println!();
            let message = format!("Build {} in {:.2}s", status, duration.as_secs_f64());
            if *status == BuildStatus::Succeeded {
                output::success(&message);
            } else {
                output::failure(&message);
            }
        }

        BuildEvent::StageStarted { stage, total_steps } => {
            output::stage_header(stage.as_str(), *total_steps);
        }

        BuildEvent::StageCompleted {
            stage,
            status,
            duration,
        } => {
            let (symbol, print): (&str, fn(&str)) = match status {
                StageStatus::Succeeded => ("OK", output::dim_success),
                StageStatus::Failed => ("FAIL", output::dim_failure),
                StageStatus::Cancelled => ("CANCELLED", output::dim_failure),
            };
            print(&format!(
                "  Stage '{}' {} ({:.2}s)",
                stage,
                symbol,
                duration.as_secs_f64()
            ));
        }

        BuildEvent::StageSkipped { stage, reason } => {
            output::warning(&format!("  Stage '{}' skipped: {}", stage, reason));
        }

        BuildEvent::StepStarted {
            step_type,
            step_index,
            ..
        } => {
            println!("      [Step {}] {}", step_index + 1, step_type);
        }

        BuildEvent::StepOutput {
            output, is_error, ..
        } => {
            for line in output.lines() {
                if *is_error {
                    output::step_error(line);
                } else {
                    output::step_output(line);
                }
            }
        }

        BuildEvent::StepCompleted {
            status, duration, ..
        } => {
            let (symbol, print): (&str, fn(&str)) = match status {
                StepStatus::Succeeded => ("OK", output::dim_success),
                StepStatus::Failed => ("FAIL", output::dim_failure),
            };
            print(&format!("        {} ({:.2}s)", symbol, duration.as_secs_f64()));
        }

        BuildEvent::Log { level, message } => match level {
            LogLevel::Error => output::error(message),
            LogLevel::Warning => output::warning(message),
            LogLevel::Info => output::dim(message),
        },
    }
}

// Output formatting helpers for agent commands

use crate::rpc::{BuildState, BuildStatusResponse, StageState};

/// Print a status message: "  Status message"
pub fn status(action: &str, message: &str) {
    eprintln!("\x1b[1;36m{:>12}\x1b[0m {}", action, message);
}

/// Print a success message with checkmark
pub fn success(message: &str) {
    eprintln!("\x1b[1;32m  \u{2713}\x1b[0m {}", message);
}

/// Print a failure message with X
pub fn failure(message: &str) {
    eprintln!("\x1b[1;31m  \u{2717}\x1b[0m {}", message);
}

pub fn warning(message: &str) {
    eprintln!("\x1b[33m  !\x1b[0m {}", message);
}

pub fn error(message: &str) {
    eprintln!("\x1b[1;31merror:\x1b[0m {}", message);
}

pub fn info(message: &str) {
    eprintln!("\x1b[36m  i\x1b[0m {}", message);
}

pub fn dim(message: &str) {
    eprintln!("\x1b[2m{}\x1b[0m", message);
}

pub fn dim_success(message: &str) {
    eprintln!("\x1b[32m{}\x1b[0m", message);
}

pub fn dim_failure(message: &str) {
    eprintln!("\x1b[31m{}\x1b[0m", message);
}

/// Print a stage header
pub fn stage_header(name: &str, total_steps: usize) {
    eprintln!("\x1b[1;34m  Stage\x1b[0m '{}' ({} steps)", name, total_steps);
}

/// Print step output (indented)
pub fn step_output(line: &str) {
    println!("        | {}", line);
}

/// Print step error output (indented, red)
pub fn step_error(line: &str) {
    eprintln!("\x1b[31m        | {}\x1b[0m", line);
}

/// Print a header line
pub fn header(message: &str) {
    eprintln!("\x1b[1m==> {}\x1b[0m", message);
}

/// One-line summary of a build as reported by an agent
pub fn build_line(build: &BuildStatusResponse) -> String {
    let mut line = format!(
        "#{} {}/{} {}",
        build.build_id,
        build.project_name,
        build.target_name,
        build.status().label()
    );
    if !build.commit_identifier.is_empty() {
        let short: String = build.commit_identifier.chars().take(7).collect();
        line.push_str(&format!(" @{}", short));
    }
    line
}

/// Print a build status report with its stages
pub fn build_report(build: &BuildStatusResponse) {
    let line = build_line(build);
    match build.status() {
        BuildState::Succeeded => success(&line),
        BuildState::Failed | BuildState::Cancelled => failure(&line),
        _ => info(&line),
    }

    for stage in &build.stages {
        let symbol = match stage.status() {
            StageState::Succeeded => "OK",
            StageState::Failed => "FAIL",
            StageState::Cancelled => "CANCELLED",
            StageState::Unspecified => "DONE",
        };
        let text = format!(
            "    {} {} ({} steps, {:.2}s)",
            stage.stage,
            symbol,
            stage.steps,
            stage.duration_ms as f64 / 1000.0
        );
        if stage.status() == StageState::Succeeded {
            dim_success(&text);
        } else {
            dim_failure(&text);
        }
    }

    for archive in &build.archives {
        dim(&format!("    archive: {}", archive));
    }
    if !build.error.is_empty() {
        error(&build.error);
    }
}

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::HarnessResult;
use crate::models::{RunReport, ScenarioOutcome, ScenarioResult, StepOutcome};

/// Human-readable summary: one line per scenario, failure detail indented below
pub fn render_summary(report: &RunReport) -> String {
    let mut out = String::new();

    for scenario in &report.scenarios {
        out.push_str(&scenario_line(scenario));
        out.push('\n');

        if scenario.outcome == ScenarioOutcome::Passed {
            continue;
        }
        match scenario.first_failure() {
            Some(step) => {
                out.push_str(&format!("      step {}: {}\n", step.step, step_detail(step)));
                for violation in &step.schema_errors {
                    let path = if violation.instance_path.is_empty() {
                        "/"
                    } else {
                        violation.instance_path.as_str()
                    };
                    out.push_str(&format!("        at {}: {}\n", path, violation.message));
                }
            }
            None => {
                if let Some(message) = &scenario.error_message {
                    out.push_str(&format!("      {}\n", message));
                }
            }
        }
    }

    out.push_str(&format!(
        "\n{} scenario(s): {} passed, {} failed, {} cancelled ({:.1}% pass rate) in {} ms\n",
        report.total,
        report.passed,
        report.failed,
        report.cancelled,
        report.pass_rate,
        report.total_duration_ms
    ));
    out
}

fn scenario_line(scenario: &ScenarioResult) -> String {
    let label = match scenario.outcome {
        ScenarioOutcome::Passed => "PASS",
        ScenarioOutcome::Failed => "FAIL",
        ScenarioOutcome::Cancelled => "SKIP",
    };
    format!("[{}] {} ({} ms)", label, scenario.name, scenario.duration_ms)
}

fn step_detail(step: &StepOutcome) -> String {
    let status = match (step.expected_status, step.actual_status) {
        (Some(expected), Some(actual)) => format!("expected status {}, got {}", expected, actual),
        (Some(expected), None) => format!("expected status {}, no response", expected),
        _ => String::new(),
    };

    match (&step.error_message, status.is_empty()) {
        (Some(message), true) => message.clone(),
        (Some(message), false) => format!("{} ({})", message, status),
        (None, _) => status,
    }
}

/// Write the report as pretty-printed JSON, creating parent directories
pub fn write_json_report(report: &RunReport, path: &Path) -> HarnessResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, report)?;
    writer.write_all(b"\n")?;
    writer.flush()?;

    tracing::info!(path = %path.display(), "Report written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{HarnessError, SchemaViolation};
    use time::OffsetDateTime;

    fn sample_report() -> RunReport {
        let passed = ScenarioResult::new("fakestore products");

        let mut failed = ScenarioResult::new("gorest lifecycle");
        failed.outcome = ScenarioOutcome::Failed;
        let error = HarnessError::assertion("status", 404, 200);
        let mut step = StepOutcome::failed("verify-gone", Some(404), &error);
        step.actual_status = Some(200);
        failed.steps.push(step);

        let mut schema = ScenarioResult::new("gorest users schema");
        schema.outcome = ScenarioOutcome::Failed;
        schema.steps.push(StepOutcome::failed(
            "GET /public/v2/users",
            Some(200),
            &HarnessError::SchemaValidation(vec![SchemaViolation {
                instance_path: "/0/id".to_string(),
                message: "\"x\" is not of type \"integer\"".to_string(),
            }]),
        ));

        let start = OffsetDateTime::now_utc();
        RunReport::new(start, start, vec![passed, failed, schema])
    }

    #[test]
    fn test_summary_lists_every_scenario() {
        let summary = render_summary(&sample_report());

        assert!(summary.contains("[PASS] fakestore products"));
        assert!(summary.contains("[FAIL] gorest lifecycle"));
        assert!(summary.contains("step verify-gone"));
        assert!(summary.contains("expected status 404, got 200"));
        assert!(summary.contains("at /0/id"));
        assert!(summary.contains("3 scenario(s): 1 passed, 2 failed, 0 cancelled"));
    }

    #[test]
    fn test_write_json_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("run.json");

        write_json_report(&sample_report(), &path).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["total"], 3);
        assert_eq!(written["failed"], 2);
        assert_eq!(written["scenarios"][1]["steps"][0]["step"], "verify-gone");
        assert_eq!(
            written["scenarios"][2]["steps"][0]["schema_errors"][0]["instance_path"],
            "/0/id"
        );
    }
}

use colored::*;

use crate::pipeline::report::PipelineReport;
use crate::redact;

/// Internal logs are opt-in via RUST_LOG; report rendering stays separate.
pub fn init_logging() {
    let mut builder = env_logger::Builder::from_default_env();
    // If user hasn't set RUST_LOG, default to warnings+.
    if std::env::var("RUST_LOG").is_err() {
        builder.filter_level(log::LevelFilter::Warn);
    }
    let _ = builder.try_init();
}

const ERROR_PREVIEW_CHARS: usize = 200;

/// Human-readable run summary for demo apps.
pub fn format_report(report: &PipelineReport) -> String {
    let mut out = String::new();

    let header = if report.success {
        format!("● {} ({:.2}s)", report.pipeline, report.execution_time)
            .green()
            .bold()
    } else {
        format!("● {} ({:.2}s)", report.pipeline, report.execution_time)
            .red()
            .bold()
    };
    out.push_str(&header.to_string());
    out.push('\n');

    for entry in &report.ledger {
        if entry.success {
            out.push_str(&format!(
                "  {} {} ({:.2}s)\n",
                "└─".green(),
                entry.step_name,
                entry.execution_time
            ));
        } else {
            let error = entry.error.as_deref().unwrap_or("failed");
            let error = redact::truncate_chars(&redact::redact_secrets(error), ERROR_PREVIEW_CHARS);
            out.push_str(&format!(
                "  {} {} ({:.2}s): {}\n",
                "└─".red(),
                entry.step_name.red(),
                entry.execution_time,
                error.red()
            ));
        }
    }

    if let Some(error) = &report.error {
        let error = redact::truncate_chars(&redact::redact_secrets(error), ERROR_PREVIEW_CHARS);
        out.push_str(&format!("{} {}\n", "error:".red().bold(), error));
    }

    out
}

pub fn print_report(report: &PipelineReport) {
    print!("{}", format_report(report));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::report::LedgerEntry;
    use crate::state::PipelineState;
    use uuid::Uuid;

    fn report(success: bool) -> PipelineReport {
        PipelineReport {
            pipeline: "lead-intake".to_string(),
            run_id: Uuid::new_v4(),
            success,
            execution_time: 1.25,
            ledger: vec![
                LedgerEntry {
                    step_name: "fetch".to_string(),
                    success: true,
                    execution_time: 0.5,
                    error: None,
                },
                LedgerEntry {
                    step_name: "score".to_string(),
                    success: false,
                    execution_time: 0.75,
                    error: Some("api_key=sk-verysecretvalue123 rejected".to_string()),
                },
            ],
            state: PipelineState::new(),
            error: if success {
                None
            } else {
                Some("score failed".to_string())
            },
        }
    }

    #[test]
    fn formats_every_ledger_entry() {
        let text = format_report(&report(true));
        assert!(text.contains("lead-intake"));
        assert!(text.contains("fetch"));
        assert!(text.contains("score"));
    }

    #[test]
    fn redacts_secrets_in_errors() {
        let text = format_report(&report(false));
        assert!(text.contains("[REDACTED]"));
        assert!(!text.contains("sk-verysecretvalue123"));
        assert!(text.contains("error:"));
    }
}

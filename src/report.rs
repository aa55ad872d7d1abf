use crate::{
    engine::{FixOutcome, FixResult},
    fixes::{GRAPHICS_GUIDE, LAUNCHER_NAME},
};
use anyhow::{Context, Result};
use serde::Serialize;

pub fn format(results: &[FixResult], graphics_guidance_included: bool) -> String {
    let mut out = String::from("=== Fixes Applied ===\n\n");
    for result in results {
        let message = result.message.as_deref().unwrap_or("");
        let line = match result.outcome {
            FixOutcome::Applied => format!("✓ {message}\n"),
            FixOutcome::Skipped => format!("- {}: skipped ({message})\n", result.id.label()),
            FixOutcome::Failed => format!("✗ {}: failed ({message})\n", result.id.label()),
        };
        out.push_str(&line);
    }
    if results.is_empty() {
        out.push_str("(no fixes selected)\n");
    }

    if graphics_guidance_included {
        out.push('\n');
        out.push_str(GRAPHICS_GUIDE);
    }

    out.push_str("\n=== Next Steps ===\n");
    out.push_str(&format!("1. Use '{LAUNCHER_NAME}' to launch the game\n"));
    out.push_str("2. If crashes persist, try disabling hardware acceleration\n");
    out.push_str("3. Consider installing dgVoodoo2 for graphics issues\n");
    out
}

#[derive(Serialize)]
struct JsonReport<'a> {
    results: &'a [FixResult],
    #[serde(skip_serializing_if = "Option::is_none")]
    graphics_guide: Option<&'static str>,
}

pub fn format_json(results: &[FixResult], graphics_guidance_included: bool) -> Result<String> {
    let report = JsonReport {
        results,
        graphics_guide: graphics_guidance_included.then_some(GRAPHICS_GUIDE),
    };
    serde_json::to_string_pretty(&report).context("serialize fix report")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixes::FixId;

    fn sample() -> Vec<FixResult> {
        vec![
            FixResult {
                id: FixId::Compatibility,
                outcome: FixOutcome::Failed,
                message: Some("access denied".to_string()),
            },
            FixResult {
                id: FixId::CpuAffinity,
                outcome: FixOutcome::Applied,
                message: Some("Created CPU affinity launcher (RainbowSix_Fixed.bat)".to_string()),
            },
            FixResult {
                id: FixId::MissionFixes,
                outcome: FixOutcome::Skipped,
                message: Some("no installation path".to_string()),
            },
        ]
    }

    #[test]
    fn text_report_lists_outcomes_then_next_steps() {
        let text = format(&sample(), false);
        assert!(text.starts_with("=== Fixes Applied ===\n\n"));
        assert!(text.contains("✓ Created CPU affinity launcher (RainbowSix_Fixed.bat)\n"));
        assert!(text.contains("✗ Apply Windows 98 Compatibility Mode: failed (access denied)\n"));
        assert!(text.contains("- Apply Mission-Specific Crash Fixes: skipped (no installation path)\n"));
        assert!(!text.contains("dgVoodoo2 Installation"));
        assert!(text.ends_with("3. Consider installing dgVoodoo2 for graphics issues\n"));
    }

    #[test]
    fn guidance_is_included_on_request() {
        let text = format(&[], true);
        assert!(text.contains("(no fixes selected)"));
        let guide = text.find("dgVoodoo2 Installation").unwrap();
        let steps = text.find("=== Next Steps ===").unwrap();
        assert!(guide < steps);
    }

    #[test]
    fn json_report_uses_snake_case_ids() {
        let raw = format_json(&sample(), false).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["results"][0]["id"], "compatibility");
        assert_eq!(value["results"][0]["outcome"], "failed");
        assert!(value.get("graphics_guide").is_none());
    }
}

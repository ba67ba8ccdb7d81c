//! HTML fleet report
//!
//! ## Table of Contents
//! - **ReportRenderer**: Renders a [`FleetSnapshot`] into one HTML document
//! - **Tone**: Cell styling derived from thresholds
//!
//! Every environment is one table row. Values are coloured by how urgently
//! they need attention; see the `*_tone` functions for the thresholds.

use crate::engine::FleetSnapshot;
use crate::types::{EnvironmentRecord, EnvironmentState, FailureSet, HealthRatio, RunSuccessRatio};
use std::fmt::Write;

/// Health or run-success at or below this is an error
pub const RATIO_ERROR_AT_OR_BELOW: u8 = 90;

/// Support months at or below this are a warning
pub const SUPPORT_WARNING_AT_OR_BELOW: u32 = 3;

const STYLE: &str = "\
body {background-color: #FFFFFF; font-family: Tahoma, sans-serif;}\
table {width: 100%;}\
td {padding: 2px; text-align: left; font-size: 12px;}\
th {background-color: #DDDDFF; padding: 3px; text-align: center; font-size: 12px;}\
p.refreshed {color: #888888; font-size: 12px;}\
p.heading {color: #333333; font-size: 16px; font-weight: 400;}\
p.th_unit {font-size: 12px; font-weight: 400; margin-block-start: 0em; margin-block-end: 0em;}\
p.failures {color: red;}\
table tr td.error {color: #bd1102; text-align: center;}\
table tr td.warning {color: #eda02b; text-align: center;}\
table tr td.normal {color: #1b9c02; text-align: center;}\
table tr td.neutral {color: black; text-align: center;}\
.topbar {overflow: hidden; background-color: #333; float: left; color: #FFFFFF; text-align: left; padding: 12px 12px; font-size: 17px;}\
tr:nth-child(even) {background-color: #f2f2f2;}\
.button {background-color: #4066CE; border: none; font-weight: 300; color: white; padding: 15px; text-align: center; display: inline-block; font-size: 16px; margin: 4px 2px; cursor: pointer; border-radius: 4px;}";

const HEADER_ROW: &str = "<tr><th>Project</th><th>Environment</th><th>Location</th><th>State</th>\
<th>Composer<br>version</th><th>Airflow<br>version</th><th>Private IP</th>\
<th>Created<p class='th_unit'>days ago</p></th><th>Updated<p class='th_unit'>days ago</p></th>\
<th>Support<p class='th_unit'>months left</p></th><th>Health<p class='th_unit'>% of time last 24h</p></th>\
<th>Successful DAG Runs<p class='th_unit'>% of all runs last 24h</p></th></tr>";

/// Cell styling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    /// Needs action
    Error,
    /// Needs attention soon
    Warning,
    /// Fine
    Normal,
    /// Informational
    Neutral,
}

impl Tone {
    /// CSS class
    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Error => "error",
            Tone::Warning => "warning",
            Tone::Normal => "normal",
            Tone::Neutral => "neutral",
        }
    }
}

/// Renders fleet snapshots
#[derive(Debug, Clone, Default)]
pub struct ReportRenderer {
    dashboard_url: String,
}

impl ReportRenderer {
    /// Create a renderer linking to a monitoring dashboard
    pub fn new(dashboard_url: impl Into<String>) -> Self {
        Self {
            dashboard_url: dashboard_url.into(),
        }
    }

    /// Render one complete HTML document
    pub fn render(&self, snapshot: &FleetSnapshot) -> String {
        let mut out = String::with_capacity(4096 + snapshot.environments.len() * 512);

        let _ = write!(out, "<html><head><style>{}</style></head><body>", STYLE);
        out.push_str("<div class='topbar'>Cloud Composer fleet manager</div>");
        let _ = write!(
            out,
            "<p class='refreshed'>Refreshed on: {} UTC</p>",
            snapshot.generated_at.format("%d/%m/%Y %H:%M:%S")
        );
        out.push_str("<p class='heading'>Environments' Monitoring Dashboard</p>");
        let _ = write!(
            out,
            "<a href='{}'><button class='button'>Go to Monitoring Dashboard</button></a><br>",
            escape(&self.dashboard_url)
        );

        if !snapshot.failures.is_empty() {
            render_failures(&mut out, &snapshot.failures);
        }

        out.push_str("<p class='heading'>List of environments</p>");
        if snapshot.environments.is_empty() {
            out.push_str("No environments found<br><br>");
        } else {
            render_environments(&mut out, &snapshot.environments);
        }

        out.push_str("</body></html>");
        out
    }
}

fn render_failures(out: &mut String, failures: &FailureSet) {
    let projects: Vec<String> = failures.projects().map(|p| escape(p.as_str())).collect();
    let _ = write!(
        out,
        "<p class='failures'>Errors found when trying to read data from the following projects: {}</p><ul>",
        projects.join(", ")
    );
    for failure in failures.iter() {
        for reason in &failure.reasons {
            let _ = write!(
                out,
                "<li><b>{}</b>: {}</li>",
                escape(failure.project.as_str()),
                escape(reason)
            );
        }
    }
    out.push_str("</ul><br>");
}

fn render_environments(out: &mut String, environments: &[EnvironmentRecord]) {
    out.push_str("<table>");
    out.push_str(HEADER_ROW);
    for env in environments {
        render_row(out, env);
    }
    out.push_str("</table>");
}

fn render_row(out: &mut String, env: &EnvironmentRecord) {
    let platform = env.version.as_ref().map(|v| v.platform.as_str()).unwrap_or("");
    let component = env.version.as_ref().map(|v| v.component.as_str()).unwrap_or("");
    let private = if env.private { "Y" } else { "N" };

    let _ = write!(
        out,
        "<tr><td>{}</td><td><a href='{}'>{}</a></td>",
        escape(env.key.project.as_str()),
        escape(&env.url),
        escape(&env.key.name)
    );
    cell(out, Tone::Neutral, env.key.region.name());
    cell(out, state_tone(&env.state), env.state.as_str());
    cell(out, platform_tone(platform), platform);
    cell(out, component_tone(component), component);
    cell(out, if env.private { Tone::Normal } else { Tone::Neutral }, private);
    cell(out, Tone::Neutral, &optional(env.created_days));
    cell(out, Tone::Neutral, &optional(env.updated_days));
    cell(out, support_tone(env.support_months), &optional(env.support_months));
    cell(out, health_tone(env.health), &env.health.to_string());
    cell(out, run_success_tone(env.run_success), &env.run_success.to_string());
    out.push_str("</tr>");
}

fn cell(out: &mut String, tone: Tone, value: &str) {
    let _ = write!(out, "<td class='{}'>{}</td>", tone.as_str(), escape(value));
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Failed environments are errors, every other state is normal
pub fn state_tone(state: &EnvironmentState) -> Tone {
    match state {
        EnvironmentState::Error => Tone::Error,
        _ => Tone::Normal,
    }
}

/// Major version 1 platforms are a warning
pub fn platform_tone(platform: &str) -> Tone {
    if platform.starts_with('1') {
        Tone::Warning
    } else {
        Tone::Normal
    }
}

/// Airflow 2 is normal, the last 1.x release a warning, anything else an error
pub fn component_tone(component: &str) -> Tone {
    if component.starts_with("2.") {
        Tone::Normal
    } else if component == "1.10.15" {
        Tone::Warning
    } else {
        Tone::Error
    }
}

/// Expired or unknown support is an error
pub fn support_tone(months: Option<u32>) -> Tone {
    match months {
        None | Some(0) => Tone::Error,
        Some(m) if m <= SUPPORT_WARNING_AT_OR_BELOW => Tone::Warning,
        Some(_) => Tone::Normal,
    }
}

/// Unknown health renders as an error
pub fn health_tone(health: HealthRatio) -> Tone {
    ratio_tone(health.percent())
}

/// No runs renders as an error
pub fn run_success_tone(runs: RunSuccessRatio) -> Tone {
    ratio_tone(runs.percent())
}

fn ratio_tone(percent: Option<u8>) -> Tone {
    match percent {
        None => Tone::Error,
        Some(p) if p <= RATIO_ERROR_AT_OR_BELOW => Tone::Error,
        Some(p) if p < 100 => Tone::Warning,
        Some(_) => Tone::Normal,
    }
}

/// Escape text for HTML element and single-quoted attribute content
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EnvironmentKey, ImageVersion, ProjectId};
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn snapshot(environments: Vec<EnvironmentRecord>, failures: FailureSet) -> FleetSnapshot {
        FleetSnapshot {
            run_id: Uuid::new_v4(),
            generated_at: Utc.with_ymd_and_hms(2024, 6, 15, 9, 5, 7).unwrap(),
            environments,
            failures,
            excluded_regions: Vec::new(),
        }
    }

    fn record(name: &str) -> EnvironmentRecord {
        let mut record = EnvironmentRecord::new(
            EnvironmentKey::new("p1", "us-east1", name),
            EnvironmentState::Running,
        );
        record.version = ImageVersion::parse("composer-2.9.7-airflow-2.9.3");
        record.private = true;
        record.created_days = Some(40);
        record.updated_days = Some(2);
        record.support_months = Some(8);
        record.health = HealthRatio::Reported(100);
        record.run_success = RunSuccessRatio::Reported(97);
        record
    }

    #[test]
    fn test_thresholds() {
        assert_eq!(health_tone(HealthRatio::Reported(90)), Tone::Error);
        assert_eq!(health_tone(HealthRatio::Reported(91)), Tone::Warning);
        assert_eq!(health_tone(HealthRatio::Reported(100)), Tone::Normal);
        assert_eq!(health_tone(HealthRatio::Unknown), Tone::Error);
        assert_eq!(run_success_tone(RunSuccessRatio::NoRuns), Tone::Error);

        assert_eq!(support_tone(Some(0)), Tone::Error);
        assert_eq!(support_tone(Some(3)), Tone::Warning);
        assert_eq!(support_tone(Some(4)), Tone::Normal);
        assert_eq!(support_tone(None), Tone::Error);

        assert_eq!(platform_tone("1.20.12"), Tone::Warning);
        assert_eq!(platform_tone("2.9.7"), Tone::Normal);
        assert_eq!(component_tone("2.9.3"), Tone::Normal);
        assert_eq!(component_tone("1.10.15"), Tone::Warning);
        assert_eq!(component_tone("1.10.12"), Tone::Error);

        assert_eq!(state_tone(&EnvironmentState::Error), Tone::Error);
        assert_eq!(state_tone(&EnvironmentState::Updating), Tone::Normal);
    }

    #[test]
    fn test_render_rows() {
        let mut unknown = record("fresh");
        unknown.health = HealthRatio::Unknown;
        unknown.run_success = RunSuccessRatio::NoRuns;

        let html = ReportRenderer::new("https://console.cloud.google.com/monitoring/dashboards/x")
            .render(&snapshot(vec![record("etl"), unknown], FailureSet::new()));

        assert!(html.starts_with("<html><head><style>"));
        assert!(html.ends_with("</body></html>"));
        assert!(html.contains("Refreshed on: 15/06/2024 09:05:07 UTC"));
        assert!(html.contains("href='https://console.cloud.google.com/monitoring/dashboards/x'"));
        assert!(html.contains(
            "<a href='https://console.cloud.google.com/composer/environments/detail/us-east1/etl?project=p1'>etl</a>"
        ));
        assert!(html.contains(
            "<td class='normal'>2.9.7</td><td class='normal'>2.9.3</td><td class='normal'>Y</td>"
        ));
        assert!(html.contains("<td class='normal'>100</td><td class='warning'>97</td>"));
        // unknown health shows 0, missing runs show nothing, both flagged
        assert!(html.contains("<td class='error'>0</td><td class='error'></td>"));
        assert!(!html.contains("Errors found"));
        assert!(!html.contains("No environments found"));
    }

    #[test]
    fn test_render_empty_with_failures() {
        let mut failures = FailureSet::new();
        failures.record(&ProjectId::new("p1"), "Permission denied <403>");
        failures.record(&ProjectId::new("p2"), "Monitoring unavailable");

        let html = ReportRenderer::new("").render(&snapshot(Vec::new(), failures));

        assert!(html.contains("No environments found"));
        assert!(html.contains("following projects: p1, p2</p>"));
        assert!(html.contains("<li><b>p1</b>: Permission denied &lt;403&gt;</li>"));
        assert!(!html.contains("<table>"));
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("a<b>&'c\""), "a&lt;b&gt;&amp;&#39;c&quot;");
        assert_eq!(escape("plain"), "plain");
    }
}

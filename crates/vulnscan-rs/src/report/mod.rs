use std::fmt::Write;

use crate::models::{Finding, ScanJob, Severity};

/// File name offered to clients downloading the report of `scan_id`.
pub fn report_filename(scan_id: i64) -> String {
    format!("scan_report_{scan_id}.html")
}

/// Self-contained HTML report of one scan and its findings.
pub fn render_html(job: &ScanJob, findings: &[Finding]) -> String {
    let mut out = String::with_capacity(4096);
    // Writing into a String cannot fail.
    let _ = write_report(&mut out, job, findings);
    out
}

fn write_report(out: &mut String, job: &ScanJob, findings: &[Finding]) -> std::fmt::Result {
    writeln!(out, "<!DOCTYPE html>")?;
    writeln!(out, "<html lang=\"en\">")?;
    writeln!(out, "<head>")?;
    writeln!(out, "<meta charset=\"utf-8\">")?;
    writeln!(out, "<title>Scan Report #{}</title>", job.scan_id)?;
    writeln!(out, "<style>{CSS}</style>")?;
    writeln!(out, "</head>")?;
    writeln!(out, "<body>")?;
    writeln!(out, "<h1>Vulnerability Scan Report</h1>")?;

    writeln!(out, "<section class=\"summary\">")?;
    writeln!(
        out,
        "<h2>Target Scanned: {}</h2>",
        html_escape(&job.targets)
    )?;
    writeln!(out, "<p>Scan ID: {}</p>", job.scan_id)?;
    writeln!(out, "<p>Scan Type: {}</p>", job.scan_type)?;
    writeln!(out, "<p>Status: {}</p>", job.status)?;
    writeln!(
        out,
        "<p>Total Vulnerabilities Found: {}</p>",
        findings.len()
    )?;
    writeln!(out, "</section>")?;

    writeln!(out, "<h2>Detailed Findings:</h2>")?;
    if findings.is_empty() {
        writeln!(out, "<p class=\"empty\">No vulnerabilities detected.</p>")?;
    } else {
        for finding in findings {
            writeln!(out, "<div class=\"finding\">")?;
            writeln!(
                out,
                "<h3 class=\"{}\">[{}] {}</h3>",
                severity_class(finding.severity),
                finding.severity,
                html_escape(&finding.title)
            )?;
            writeln!(
                out,
                "<pre>Description: {}</pre>",
                html_escape(&finding.description)
            )?;
            if let Some(steps) = &finding.remediation_steps {
                writeln!(out, "<p>Remediation: {}</p>", html_escape(steps))?;
            }
            writeln!(out, "</div>")?;
        }
    }

    writeln!(out, "</body>")?;
    writeln!(out, "</html>")
}

fn severity_class(severity: Severity) -> &'static str {
    match severity {
        Severity::High => "sev-high",
        Severity::Medium => "sev-medium",
        Severity::Low => "sev-low",
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

const CSS: &str = "\
body{font-family:Arial,Helvetica,sans-serif;margin:2em;color:#000}\
h1{text-align:center}\
.summary p{margin:.3em 0}\
.finding{margin-bottom:1.2em}\
.finding pre{white-space:pre-wrap;font-family:inherit;margin:.3em 0}\
.empty{font-style:italic}\
.sev-high{color:rgb(220,53,69)}\
.sev-medium{color:rgb(255,193,7)}\
.sev-low{color:rgb(0,128,0)}";

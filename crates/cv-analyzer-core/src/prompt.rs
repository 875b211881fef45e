//! Deterministic prompt rendering and report conformance checks.
//!
//! The prompt embeds the candidate and job context plus the document text,
//! then pins the report format: a fixed two-line header, the `[GOOD]` /
//! `[BAD]` tagging convention, and a fixed section list. Identical inputs
//! always render byte-identical prompts.

use crate::models::{JobContext, ScoredPassage, SubjectContext};

/// System message sent ahead of every analysis prompt.
pub const SYSTEM_INSTRUCTION: &str = "You are an Elite Recruitment Analyst. You must ALWAYS follow the HEADER instructions exactly. Never refer to yourself as 'AI Career Coach' or use generic placeholders.";

/// Marker for positive points in a report.
pub const GOOD_MARKER: &str = "[GOOD]";

/// Marker for negative points in a report.
pub const BAD_MARKER: &str = "[BAD]";

/// First header line of a report for `company`.
pub fn header_prepared_for(company: &str) -> String {
    format!("## Prepared for: {}", company)
}

/// Second header line of a report prepared by `preparer`.
pub fn header_prepared_by(preparer: &str) -> String {
    format!("### Prepared by: {}", preparer)
}

/// Render the user prompt for one analysis.
pub fn render_prompt(subject: &SubjectContext, job: &JobContext, document_text: &str) -> String {
    let preparer = subject.preparer();
    let preferences = subject.analysis_preferences.join(", ");

    let mut out = String::with_capacity(2048 + document_text.len());

    out.push_str(
        "You are an expert HR Consultant and ATS Specialist. \
         Your task is to analyze a CV against a specific Job Description.\n\n",
    );

    out.push_str("USER DETAILS:\n");
    out.push_str(&format!("Name: {}\n", preparer));
    out.push_str(&format!("Current Level: {}\n", subject.current_career_level));
    out.push_str(&format!("Focus Areas: {}\n", preferences));
    out.push_str(&format!("Target Country: {}\n\n", subject.target_country));

    out.push_str("JOB CONTEXT:\n");
    out.push_str(&format!("Job Title: {}\n", job.job_title));
    out.push_str(&format!("Target Company/Dept: {}\n", job.target_company));
    out.push_str(&format!("Industry: {}\n", job.industry));
    out.push_str(&format!("Experience Level: {}\n\n", job.experience_level));

    out.push_str("JOB DESCRIPTION:\n\"\"\"\n");
    out.push_str(job.job_description.trim());
    out.push_str("\n\"\"\"\n\n");

    out.push_str("RESUME / CV CONTENT:\n\"\"\"\n");
    out.push_str(document_text.trim());
    out.push_str("\n\"\"\"\n\n");

    out.push_str(
        "Please provide a comprehensive analysis. \
         Structure your response as a professional report (Markdown format).\n\n",
    );

    out.push_str("HEADER:\nBegin the report with exactly these two lines:\n");
    out.push_str(&format!("\"{}\"\n", header_prepared_for(&job.target_company)));
    out.push_str(&format!("\"{}\"\n\n", header_prepared_by(preparer)));

    out.push_str("IMPORTANT: You MUST use these semantic markers for EVERY point:\n");
    out.push_str(&format!(
        "- Start EVERY positive point, strength, or matching skill with the exact tag `{}`.\n",
        GOOD_MARKER
    ));
    out.push_str(&format!(
        "- Start EVERY negative point, gap, or improvement area with the exact tag `{}`.\n\n",
        BAD_MARKER
    ));
    out.push_str("Example:\n");
    out.push_str(&format!("- {} Strong experience in PHP.\n", GOOD_MARKER));
    out.push_str(&format!("- {} Lacks AWS certification.\n\n", BAD_MARKER));

    out.push_str("Include these sections:\n");
    out.push_str("1. **Overall Match Score** (0-100)\n");
    out.push_str("2. **Key Strengths**\n");
    out.push_str("3. **Missing Keywords & Skills**\n");
    out.push_str("4. **Structure & Formatting Feedback**\n");
    out.push_str(&format!(
        "5. **Strategic Recommendations** (Tailored for {} standards)\n\n",
        subject.target_country
    ));

    out.push_str("Be critical but constructive.\n");
    out
}

/// Join retrieved passages into the document text slot of the prompt.
///
/// Passages are emitted in document order (by position), not score order,
/// separated by blank lines.
pub fn render_passages(passages: &[ScoredPassage<'_>]) -> String {
    let mut ordered: Vec<&ScoredPassage<'_>> = passages.iter().collect();
    ordered.sort_by_key(|s| s.passage.position);
    ordered
        .iter()
        .map(|s| s.passage.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Ways a generated report can deviate from the requested format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConformanceIssue {
    MissingPreparedFor,
    MissingPreparedBy,
    MissingGoodMarker,
    MissingBadMarker,
}

/// Check a report against the header and marker conventions.
///
/// Returns an empty list for a conforming report. Leading blank lines are
/// tolerated before the header.
pub fn check_report(report: &str, subject: &SubjectContext, job: &JobContext) -> Vec<ConformanceIssue> {
    let mut issues = Vec::new();
    let mut lines = report.lines().map(str::trim).filter(|l| !l.is_empty());

    if lines.next() != Some(header_prepared_for(&job.target_company).as_str()) {
        issues.push(ConformanceIssue::MissingPreparedFor);
    }
    if lines.next() != Some(header_prepared_by(subject.preparer()).as_str()) {
        issues.push(ConformanceIssue::MissingPreparedBy);
    }
    if !report.contains(GOOD_MARKER) {
        issues.push(ConformanceIssue::MissingGoodMarker);
    }
    if !report.contains(BAD_MARKER) {
        issues.push(ConformanceIssue::MissingBadMarker);
    }
    issues
}

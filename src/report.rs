use std::fmt::Write as _;
use std::io::Write;

use chrono::{DateTime, NaiveDate, Utc};

use crate::models::{CancellationResponse, FollowupResponse, Statistics, Tally};
use crate::stats::DateRange;

const DATE_FORMAT: &str = "%d/%m/%Y %H:%M";

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(DATE_FORMAT).to_string()
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "Yes"
    } else {
        "No"
    }
}

fn or_na(value: Option<&str>) -> &str {
    value.unwrap_or("N/A")
}

fn write_tally(output: &mut String, title: &str, tally: &Tally) {
    let _ = writeln!(output, "### {title}");
    for (answer, count) in tally.iter() {
        let _ = writeln!(output, "- {answer}: {count}");
    }
}

pub fn build_report(
    stats: &Statistics,
    range: Option<&DateRange>,
    cancellations: &[CancellationResponse],
    followups: &[FollowupResponse],
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Cancellation Feedback Report");
    match range {
        Some(range) => {
            let _ = writeln!(
                output,
                "Responses between {} and {}",
                format_timestamp(range.start),
                format_timestamp(range.end)
            );
        }
        None => {
            let _ = writeln!(output, "All stored responses");
        }
    }
    let _ = writeln!(output);
    let _ = writeln!(output, "- Cancellation surveys: {}", stats.total_cancellations);
    let _ = writeln!(output, "- Follow-up surveys: {}", stats.total_followups);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Cancellation Survey");
    match &stats.cancellation {
        None => {
            let _ = writeln!(output, "No cancellation responses recorded.");
        }
        Some(cancellation) => {
            let _ = writeln!(output, "- Proposal adjusted: {}%", cancellation.proposal_adjusted);
            let _ = writeln!(output, "- Attention met expectations: {}%", cancellation.attention_met);
            let _ = writeln!(output, "- Found an alternative: {}%", cancellation.found_alternative);
            write_tally(&mut output, "Main reasons", &cancellation.main_reasons);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Follow-up Survey");
    match &stats.followup {
        None => {
            let _ = writeln!(output, "No follow-up responses recorded.");
        }
        Some(followup) => {
            let _ = writeln!(output, "- Want the proposal adjusted: {}%", followup.wants_adjustment);
            let _ = writeln!(output, "- Want a visit or call: {}%", followup.wants_visit_or_call);
            let _ = writeln!(output, "- Want contact within 24h: {}%", followup.wants_contact_24h);
            write_tally(&mut output, "Blocking aspects", &followup.blocking_aspects);
            write_tally(&mut output, "Team attention", &followup.team_attention);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Contact Requests");
    let contacts: Vec<&FollowupResponse> = followups
        .iter()
        .filter(|f| f.contact_name.is_some() || f.contact_phone.is_some())
        .take(10)
        .collect();
    if contacts.is_empty() {
        let _ = writeln!(output, "No contact requests in this window.");
    } else {
        for followup in contacts {
            let _ = writeln!(
                output,
                "- {} ({}) on {}: {}",
                or_na(followup.contact_name.as_deref()),
                or_na(followup.contact_phone.as_deref()),
                format_timestamp(followup.submitted_at),
                followup.blocking_aspect
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Cancellation Reasons");
    if cancellations.is_empty() {
        let _ = writeln!(output, "No cancellation responses in this window.");
    } else {
        for cancellation in cancellations.iter().take(5) {
            let _ = writeln!(
                output,
                "- {}: {}",
                format_timestamp(cancellation.submitted_at),
                cancellation.main_reason
            );
        }
    }

    output
}

pub fn export_file_name(today: NaiveDate) -> String {
    format!("feedback-{}.csv", today.format("%Y-%m-%d"))
}

/// Writes the two-section CSV export, prefixed with a UTF-8 BOM so
/// spreadsheet tools pick the right encoding.
pub fn export_csv<W: Write>(
    mut out: W,
    cancellations: &[CancellationResponse],
    followups: &[FollowupResponse],
) -> anyhow::Result<()> {
    out.write_all("\u{feff}CANCELLATION SURVEYS\n\n".as_bytes())?;
    {
        let mut writer = csv::Writer::from_writer(&mut out);
        writer.write_record([
            "Date",
            "Proposal Adjusted",
            "Attention Met",
            "Found Alternative",
            "Reason",
            "Name",
            "Phone",
        ])?;
        for r in cancellations {
            writer.write_record([
                format_timestamp(r.submitted_at).as_str(),
                yes_no(r.proposal_adjusted),
                yes_no(r.attention_met),
                yes_no(r.found_alternative),
                r.main_reason.as_str(),
                or_na(r.contact_name.as_deref()),
                or_na(r.contact_phone.as_deref()),
            ])?;
        }
        writer.flush()?;
    }

    out.write_all(b"\n\nFOLLOW-UP SURVEYS\n\n")?;
    {
        let mut writer = csv::Writer::from_writer(&mut out);
        writer.write_record([
            "Date",
            "Blocking Aspect",
            "Adjust Proposal",
            "Attention",
            "Visit/Call",
            "Contact 24h",
            "Name",
            "Phone",
        ])?;
        for r in followups {
            writer.write_record([
                format_timestamp(r.submitted_at).as_str(),
                r.blocking_aspect.as_str(),
                yes_no(r.wants_adjustment),
                r.team_attention.as_str(),
                yes_no(r.wants_visit_or_call),
                yes_no(r.wants_contact_24h),
                or_na(r.contact_name.as_deref()),
                or_na(r.contact_phone.as_deref()),
            ])?;
        }
        writer.flush()?;
    }

    Ok(())
}

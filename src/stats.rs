use chrono::{DateTime, Duration, Months, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::models::{
    CancellationResponse, CancellationStats, FollowupResponse, FollowupStats, Statistics, Tally,
    Timestamped,
};

pub fn compute_statistics(
    cancellations: &[CancellationResponse],
    followups: &[FollowupResponse],
) -> Statistics {
    Statistics {
        total_cancellations: cancellations.len(),
        total_followups: followups.len(),
        cancellation: cancellation_stats(cancellations),
        followup: followup_stats(followups),
    }
}

fn cancellation_stats(responses: &[CancellationResponse]) -> Option<CancellationStats> {
    if responses.is_empty() {
        return None;
    }

    Some(CancellationStats {
        proposal_adjusted: share(responses, |r| r.proposal_adjusted),
        attention_met: share(responses, |r| r.attention_met),
        found_alternative: share(responses, |r| r.found_alternative),
        main_reasons: responses.iter().map(|r| r.main_reason.as_str()).collect(),
    })
}

fn followup_stats(responses: &[FollowupResponse]) -> Option<FollowupStats> {
    if responses.is_empty() {
        return None;
    }

    Some(FollowupStats {
        wants_adjustment: share(responses, |r| r.wants_adjustment),
        wants_visit_or_call: share(responses, |r| r.wants_visit_or_call),
        wants_contact_24h: share(responses, |r| r.wants_contact_24h),
        blocking_aspects: responses
            .iter()
            .map(|r| r.blocking_aspect.as_str())
            .collect::<Tally>(),
        team_attention: responses
            .iter()
            .map(|r| r.team_attention.as_str())
            .collect::<Tally>(),
    })
}

fn share<T>(records: &[T], predicate: impl Fn(&T) -> bool) -> u32 {
    let matching = records.iter().filter(|r| predicate(*r)).count();
    percentage(matching, records.len())
}

/// `matching / total * 100`, rounded half away from zero. A zero total yields 0.
pub fn percentage(matching: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((matching as f64 / total as f64) * 100.0).round() as u32
}

/// Records whose timestamp falls in `[start, end]`, newest first.
pub fn filter_by_date_range<T: Timestamped + Clone>(
    records: &[T],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<T> {
    let mut matching: Vec<T> = records
        .iter()
        .filter(|r| {
            let at = r.timestamp();
            at >= start && at <= end
        })
        .cloned()
        .collect();
    matching.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
    matching
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangePreset {
    Today,
    Week,
    Month,
    All,
    Custom { from: NaiveDate, to: NaiveDate },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn resolve(preset: RangePreset, now: DateTime<Utc>) -> Option<Self> {
        let today = now.date_naive();
        let (first_day, last_day) = match preset {
            RangePreset::Today => (today, today),
            RangePreset::Week => (today - Duration::days(7), today),
            RangePreset::Month => (today.checked_sub_months(Months::new(1))?, today),
            RangePreset::All => (NaiveDate::from_ymd_opt(2000, 1, 1)?, today),
            RangePreset::Custom { from, to } => {
                if from > to {
                    return None;
                }
                (from, to)
            }
        };

        Some(Self {
            start: Utc.from_utc_datetime(&first_day.and_time(NaiveTime::MIN)),
            end: Utc.from_utc_datetime(&last_day.and_hms_milli_opt(23, 59, 59, 999)?),
        })
    }

    pub fn apply<T: Timestamped + Clone>(&self, records: &[T]) -> Vec<T> {
        filter_by_date_range(records, self.start, self.end)
    }
}

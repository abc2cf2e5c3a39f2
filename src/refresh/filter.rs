//! Filter pipeline.
//!
//! A pure decision per unseen item. Gates run in a fixed order and the first
//! rejection wins; rejections are values, never errors.

use std::{collections::HashSet, fmt};

use chrono::{Duration, NaiveDate};

use crate::{
    config::Exclusions,
    types::{RecordType, RecordTypeFilter, ReleaseRecord},
    utils,
};

/// What to do with an unseen item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Actionable now: queue it and add it to the digest.
    Queue,
    /// Record as seen without queueing.
    RecordOnly(SkipReason),
    /// Dated after the refresh clock: record with the future flag.
    Future,
}

impl Disposition {
    pub fn is_queue(&self) -> bool {
        matches!(self, Disposition::Queue)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    InvalidReleaseDate(String),
    ExplicitSibling,
    RecordType(RecordType),
    Excluded(String),
    TooOld { max_age_days: u32 },
    NewEntity,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::InvalidReleaseDate(date) => write!(f, "unparsable release date '{date}'"),
            SkipReason::ExplicitSibling => f.write_str("an explicit version with the same title exists"),
            SkipReason::RecordType(t) => write!(f, "record type '{t}' not allowed"),
            SkipReason::Excluded(rule) => write!(f, "title matches exclusion '{rule}'"),
            SkipReason::TooOld { max_age_days } => write!(f, "older than {max_age_days} days"),
            SkipReason::NewEntity => f.write_str("back catalog of a newly monitored entity"),
        }
    }
}

/// Everything the pipeline needs to decide on one item.
#[derive(Debug, Clone, Copy)]
pub struct FilterContext<'a> {
    /// The refresh clock: the time-machine date if set, else today.
    pub clock: NaiveDate,
    pub time_machine: bool,
    pub ignore_filters: bool,
    pub record_types: &'a RecordTypeFilter,
    /// `None` disables the age gate.
    pub release_max_age: Option<u32>,
    pub exclusions: &'a Exclusions,
    /// The owning entity had nothing in the seen ledger before this run.
    pub new_entity: bool,
    /// Titles of the owning artist's explicit releases, as fetched this run.
    pub explicit_titles: &'a HashSet<String>,
}

/// Titles of every explicit release in `releases`.
pub fn explicit_titles(releases: &[ReleaseRecord]) -> HashSet<String> {
    releases
        .iter()
        .filter(|r| r.explicit)
        .map(|r| r.title.clone())
        .collect()
}

pub fn evaluate(release: &ReleaseRecord, ctx: &FilterContext<'_>) -> Disposition {
    let Some(release_date) = utils::parse_release_date(&release.release_date) else {
        return Disposition::RecordOnly(SkipReason::InvalidReleaseDate(release.release_date.clone()));
    };

    if release_date > ctx.clock {
        return Disposition::Future;
    }

    if !release.explicit && ctx.explicit_titles.contains(&release.title) {
        return Disposition::RecordOnly(SkipReason::ExplicitSibling);
    }

    if ctx.ignore_filters {
        return Disposition::Queue;
    }

    if !ctx.record_types.allows(release.record_type) {
        return Disposition::RecordOnly(SkipReason::RecordType(release.record_type));
    }

    if let Some(rule) = ctx.exclusions.matching_rule(&release.title) {
        return Disposition::RecordOnly(SkipReason::Excluded(rule.to_string()));
    }

    if let Some(max_age_days) = ctx.release_max_age {
        let cutoff = ctx.clock - Duration::days(i64::from(max_age_days));
        if release_date < cutoff {
            return Disposition::RecordOnly(SkipReason::TooOld { max_age_days });
        }
    }

    if ctx.new_entity && !ctx.time_machine {
        return Disposition::RecordOnly(SkipReason::NewEntity);
    }

    Disposition::Queue
}

/// Playlist tracks carry no date or type, so only the bulk override and
/// new-entity suppression apply.
pub fn evaluate_track(ctx: &FilterContext<'_>) -> Disposition {
    if ctx.ignore_filters {
        return Disposition::Queue;
    }
    if ctx.new_entity && !ctx.time_machine {
        return Disposition::RecordOnly(SkipReason::NewEntity);
    }
    Disposition::Queue
}

/// Calendar-day grouping
use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::state::data::MediaRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Placeholder,
    Rendered,
}

/// All media captured on one calendar day
#[derive(Debug, Clone, PartialEq)]
pub struct DateGroup {
    pub date: NaiveDate,
    /// Indices into the loaded record list, in load order
    pub members: Vec<usize>,
    pub render_state: RenderState,
}

impl DateGroup {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_rendered(&self) -> bool {
        self.render_state == RenderState::Rendered
    }

    /// Header label, e.g. "Sat, May 4 2024"
    pub fn title(&self) -> String {
        self.date.format("%a, %b %-d %Y").to_string()
    }
}

/// Split records into day groups, newest day first
///
/// Members keep the order they have in `records`, so a list sorted by
/// capture time descending yields members sorted the same way.
pub fn group_by_day(records: &[MediaRecord]) -> Vec<DateGroup> {
    let mut days: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();
    for (index, record) in records.iter().enumerate() {
        days.entry(record.day()).or_default().push(index);
    }

    days.into_iter()
        .rev()
        .map(|(date, members)| DateGroup {
            date,
            members,
            render_state: RenderState::Placeholder,
        })
        .collect()
}

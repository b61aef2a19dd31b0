use std::path::Path;

use crate::{domain::Channel, Result};

/// Keep channels with at least `min_members` members. Unknown counts are dropped.
pub fn retain_min_members(channels: Vec<Channel>, min_members: u32) -> Vec<Channel> {
    channels
        .into_iter()
        .filter(|c| c.member_count.is_some_and(|n| n > 0 && n >= min_members))
        .collect()
}

/// Largest channels first; stable for equal counts.
pub fn sort_by_member_count(channels: &mut [Channel]) {
    channels.sort_by(|a, b| {
        b.member_count
            .unwrap_or(0)
            .cmp(&a.member_count.unwrap_or(0))
    });
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FilterReport {
    pub original: usize,
    pub filtered: usize,
}

/// Offline pass over an exported channel list (`[{id, name, memberCount}]`).
///
/// Keeps channels with at least `min_members` members, sorts them largest
/// first and writes the result as pretty JSON.
pub fn filter_channel_file(input: &Path, output: &Path, min_members: u32) -> Result<FilterReport> {
    let txt = std::fs::read_to_string(input)?;
    let channels: Vec<Channel> = serde_json::from_str(&txt)?;
    let original = channels.len();

    let mut kept = retain_min_members(channels, min_members);
    sort_by_member_count(&mut kept);

    std::fs::write(output, serde_json::to_string_pretty(&kept)?)?;
    Ok(FilterReport {
        original,
        filtered: kept.len(),
    })
}

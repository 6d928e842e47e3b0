use crate::error::{Error, Result};
use crate::models::mkv::{Attribute, ReportValue};
use crate::models::stream_info::StreamInfo;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TitleInfo {
    pub id: u32,
    pub name: Option<ReportValue>,
    pub chapter_count: Option<ReportValue>,
    pub duration: Option<ReportValue>,
    pub disk_size: Option<ReportValue>,
    pub disk_size_bytes: Option<ReportValue>,
    pub segments_count: Option<ReportValue>,
    pub segments_map: Option<ReportValue>,
    pub output_file_name: Option<ReportValue>,
    pub streams: BTreeMap<u32, StreamInfo>,
}

impl TitleInfo {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    /// Stores `value` under `attribute`. Returns false for attributes a title
    /// doesn't carry.
    pub fn set_field(&mut self, attribute: Attribute, value: ReportValue) -> bool {
        let field = match attribute {
            Attribute::Name => &mut self.name,
            Attribute::ChapterCount => &mut self.chapter_count,
            Attribute::Duration => &mut self.duration,
            Attribute::DiskSize => &mut self.disk_size,
            Attribute::DiskSizeBytes => &mut self.disk_size_bytes,
            Attribute::SegmentsCount => &mut self.segments_count,
            Attribute::SegmentsMap => &mut self.segments_map,
            Attribute::OutputFileName => &mut self.output_file_name,
            _ => return false,
        };
        *field = Some(value);
        true
    }

    pub fn stream_mut(&mut self, id: u32) -> &mut StreamInfo {
        self.streams.entry(id).or_insert_with(|| StreamInfo::new(id))
    }

    /// Duration in seconds. A title without a duration counts as zero long,
    /// a duration that is not `H:MM:SS` is an error.
    pub fn duration_seconds(&self) -> Result<u64> {
        match &self.duration {
            None => Ok(0),
            Some(ReportValue::Text(duration)) => duration_to_seconds(duration),
            Some(ReportValue::Int(number)) => Err(Error::parse_error(
                format!("title {} has a duration without colons: {number}", self.id),
            )),
        }
    }

    pub fn chapters(&self) -> u64 {
        self.chapter_count
            .as_ref()
            .and_then(ReportValue::as_int)
            .unwrap_or(0)
    }

    pub fn segment_map(&self) -> Option<Vec<u32>> {
        self.segments_map.as_ref().map(|map| {
            map.to_string()
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect()
        })
    }

    pub fn count_streams(&self, stream_type: &str) -> usize {
        self.streams
            .values()
            .filter(|stream| stream.is_type(stream_type))
            .count()
    }

    pub fn has_audio(&self) -> bool {
        self.streams.values().any(StreamInfo::is_audio)
    }
}

/// Converts `H:MM:SS` to seconds.
pub fn duration_to_seconds(duration: &str) -> Result<u64> {
    let malformed = || Error::parse_error(format!("malformed duration {duration:?}"));
    let parts: Vec<&str> = duration.split(':').collect();
    if parts.len() != 3 {
        return Err(malformed());
    }
    let mut numbers = [0u64; 3];
    for (number, part) in numbers.iter_mut().zip(&parts) {
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        *number = part.parse().map_err(|_| malformed())?;
    }
    let [hours, minutes, seconds] = numbers;
    hours
        .checked_mul(3600)
        .and_then(|total| total.checked_add(minutes.checked_mul(60)?))
        .and_then(|total| total.checked_add(seconds))
        .ok_or_else(malformed)
}

use serde::Serialize;
use std::fmt;

/// A single positional field of a makemkvcon robot mode line. Fields made of
/// decimal digits only are integers, everything else stays text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ReportValue {
    Int(u64),
    Text(String),
}

impl ReportValue {
    pub fn coerce(field: &str) -> Self {
        if !field.is_empty() && field.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(number) = field.parse::<u64>() {
                return ReportValue::Int(number);
            }
        }
        ReportValue::Text(field.to_string())
    }

    pub fn as_int(&self) -> Option<u64> {
        match self {
            ReportValue::Int(number) => Some(*number),
            ReportValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ReportValue::Int(_) => None,
            ReportValue::Text(text) => Some(text),
        }
    }
}

impl fmt::Display for ReportValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportValue::Int(number) => write!(f, "{number}"),
            ReportValue::Text(text) => write!(f, "{text}"),
        }
    }
}

/// The attribute ids (`AP_ItemAttributeId` in makemkv's apdefs.h) this crate
/// understands. Any other id is ignored by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    Type,
    Name,
    LangCode,
    LangName,
    CodecShort,
    ChapterCount,
    Duration,
    DiskSize,
    DiskSizeBytes,
    Bitrate,
    AudioChannelsCount,
    AudioSampleRate,
    VideoSize,
    VideoAspectRatio,
    VideoFrameRate,
    SegmentsCount,
    SegmentsMap,
    OutputFileName,
}

impl Attribute {
    pub fn from_code(code: u64) -> Option<Self> {
        let attribute = match code {
            1 => Attribute::Type,
            2 => Attribute::Name,
            3 => Attribute::LangCode,
            4 => Attribute::LangName,
            6 => Attribute::CodecShort,
            8 => Attribute::ChapterCount,
            9 => Attribute::Duration,
            10 => Attribute::DiskSize,
            11 => Attribute::DiskSizeBytes,
            13 => Attribute::Bitrate,
            14 => Attribute::AudioChannelsCount,
            17 => Attribute::AudioSampleRate,
            19 => Attribute::VideoSize,
            20 => Attribute::VideoAspectRatio,
            21 => Attribute::VideoFrameRate,
            25 => Attribute::SegmentsCount,
            26 => Attribute::SegmentsMap,
            27 => Attribute::OutputFileName,
            _ => return None,
        };
        Some(attribute)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Attribute::Type => "type",
            Attribute::Name => "name",
            Attribute::LangCode => "lang_code",
            Attribute::LangName => "lang_name",
            Attribute::CodecShort => "codec_short",
            Attribute::ChapterCount => "chapter_count",
            Attribute::Duration => "duration",
            Attribute::DiskSize => "disk_size",
            Attribute::DiskSizeBytes => "disk_size_bytes",
            Attribute::Bitrate => "bitrate",
            Attribute::AudioChannelsCount => "audio_channels_count",
            Attribute::AudioSampleRate => "audio_sample_rate",
            Attribute::VideoSize => "video_size",
            Attribute::VideoAspectRatio => "video_aspect_ratio",
            Attribute::VideoFrameRate => "video_frame_rate",
            Attribute::SegmentsCount => "segments_count",
            Attribute::SegmentsMap => "segments_map",
            Attribute::OutputFileName => "output_file_name",
        }
    }
}

// Progress output of `makemkvcon mkv --progress=-same`

/// PRGV:current,total,max
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PRGV {
    pub current: u64,
    pub total: u64,
    pub pmax: u64,
}

impl PRGV {
    /// Overall progress as a fraction between 0 and 1.
    pub fn fraction(&self) -> f64 {
        if self.pmax == 0 {
            return 0.0;
        }
        (self.total as f64 / self.pmax as f64).clamp(0.0, 1.0)
    }
}

/// PRGT / PRGC: code,id,name
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressTitle {
    pub code: u64,
    pub id: u64,
    pub name: String,
}

/// MSG:code,flags,count,message,format,param0,...
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MSG {
    pub code: u64,
    pub flags: u64,
    pub mcount: u64,
    pub message: String,
    pub format: String,
    pub params: Vec<String>,
}

impl MSG {
    /// Code makemkvcon uses for the summary of a failed operation.
    pub const FAILURE_SUMMARY: u64 = 5003;
}

/// Events of an extraction run, handed to the progress callback.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RipEvent {
    Progress(PRGV),
    TotalTitle(ProgressTitle),
    CurrentTitle(ProgressTitle),
    Message(MSG),
}

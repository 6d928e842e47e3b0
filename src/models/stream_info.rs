use crate::models::mkv::{Attribute, ReportValue};
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StreamInfo {
    pub id: u32,
    #[serde(rename = "type")]
    pub type_: Option<ReportValue>,
    pub lang_code: Option<ReportValue>,
    pub lang_name: Option<ReportValue>,
    pub codec_short: Option<ReportValue>,
    pub bitrate: Option<ReportValue>,
    pub audio_channels_count: Option<ReportValue>,
    pub audio_sample_rate: Option<ReportValue>,
    pub video_size: Option<ReportValue>,
    pub video_aspect_ratio: Option<ReportValue>,
    pub video_frame_rate: Option<ReportValue>,
}

impl StreamInfo {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn set_field(&mut self, attribute: Attribute, value: ReportValue) -> bool {
        let field = match attribute {
            Attribute::Type => &mut self.type_,
            Attribute::LangCode => &mut self.lang_code,
            Attribute::LangName => &mut self.lang_name,
            Attribute::CodecShort => &mut self.codec_short,
            Attribute::Bitrate => &mut self.bitrate,
            Attribute::AudioChannelsCount => &mut self.audio_channels_count,
            Attribute::AudioSampleRate => &mut self.audio_sample_rate,
            Attribute::VideoSize => &mut self.video_size,
            Attribute::VideoAspectRatio => &mut self.video_aspect_ratio,
            Attribute::VideoFrameRate => &mut self.video_frame_rate,
            _ => return false,
        };
        *field = Some(value);
        true
    }

    /// Case insensitive substring match on the stream type, so "Subtitles"
    /// is a "subtitle" stream.
    pub fn is_type(&self, stream_type: &str) -> bool {
        self.type_
            .as_ref()
            .and_then(ReportValue::as_text)
            .is_some_and(|type_| type_.to_lowercase().contains(&stream_type.to_lowercase()))
    }

    pub fn is_audio(&self) -> bool {
        self.is_type("audio")
    }

    pub fn lang(&self) -> Option<String> {
        self.lang_code
            .as_ref()
            .and_then(ReportValue::as_text)
            .map(str::to_string)
    }
}

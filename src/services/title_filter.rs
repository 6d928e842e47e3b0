use crate::models::title_info::TitleInfo;
use log::info;
use std::collections::BTreeMap;

/// Keeps the titles that have at least one audio stream in one of
/// `languages`.
///
/// Titles without any audio stream go first, then titles whose audio is
/// only in other languages. Streams of the titles that stay are untouched.
pub fn filter_titles(
    titles: &BTreeMap<u32, TitleInfo>,
    languages: &[String],
) -> BTreeMap<u32, TitleInfo> {
    let with_audio: BTreeMap<u32, TitleInfo> = titles
        .iter()
        .filter(|(_, title)| title.has_audio())
        .map(|(id, title)| (*id, title.clone()))
        .collect();
    info!(
        "Dropped {} titles without audio",
        titles.len() - with_audio.len()
    );

    let wanted: BTreeMap<u32, TitleInfo> = with_audio
        .into_iter()
        .filter(|(_, title)| has_audio_in(title, languages))
        .collect();
    info!(
        "{} titles have audio in {}",
        wanted.len(),
        languages.join(", ")
    );
    wanted
}

fn has_audio_in(title: &TitleInfo, languages: &[String]) -> bool {
    title
        .streams
        .values()
        .filter(|stream| stream.is_audio())
        .filter_map(|stream| stream.lang())
        .any(|lang| languages.contains(&lang))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::mkv::{Attribute, ReportValue};

    fn stream(title: &mut TitleInfo, id: u32, type_: &str, lang: Option<&str>) {
        let stream = title.stream_mut(id);
        stream.set_field(Attribute::Type, ReportValue::Text(type_.to_string()));
        if let Some(lang) = lang {
            stream.set_field(Attribute::LangCode, ReportValue::Text(lang.to_string()));
        }
    }

    fn titles() -> BTreeMap<u32, TitleInfo> {
        let mut english = TitleInfo::new(0);
        stream(&mut english, 0, "Video", None);
        stream(&mut english, 1, "Audio", Some("eng"));

        let mut japanese = TitleInfo::new(1);
        stream(&mut japanese, 0, "Video", None);
        stream(&mut japanese, 1, "Audio", Some("jpn"));
        stream(&mut japanese, 2, "Subtitles", Some("eng"));

        let mut silent = TitleInfo::new(2);
        stream(&mut silent, 0, "Video", None);

        let mut no_streams = TitleInfo::new(3);
        no_streams.set_field(Attribute::Duration, ReportValue::Text("0:01:00".to_string()));

        [english, japanese, silent, no_streams]
            .into_iter()
            .map(|title| (title.id, title))
            .collect()
    }

    fn languages(codes: &[&str]) -> Vec<String> {
        codes.iter().map(|code| code.to_string()).collect()
    }

    #[test]
    fn test_keeps_only_allowed_audio_languages() {
        let filtered = filter_titles(&titles(), &languages(&["eng"]));
        assert_eq!(filtered.keys().copied().collect::<Vec<_>>(), vec![0]);
        assert_eq!(filtered[&0], titles()[&0]);
    }

    #[test]
    fn test_subtitle_language_does_not_count() {
        let filtered = filter_titles(&titles(), &languages(&["eng"]));
        assert!(!filtered.contains_key(&1));
    }

    #[test]
    fn test_multiple_languages() {
        let filtered = filter_titles(&titles(), &languages(&["jpn", "eng"]));
        assert_eq!(filtered.keys().copied().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn test_filter_is_idempotent() {
        let allowed = languages(&["eng", "jpn"]);
        let once = filter_titles(&titles(), &allowed);
        let twice = filter_titles(&once, &allowed);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_empty_allow_list_drops_everything() {
        assert!(filter_titles(&titles(), &[]).is_empty());
    }

    #[test]
    fn test_audio_type_is_case_insensitive() {
        let mut title = TitleInfo::new(5);
        stream(&mut title, 0, "AUDIO", Some("eng"));
        let titles = BTreeMap::from([(5, title)]);
        assert_eq!(filter_titles(&titles, &languages(&["eng"])).len(), 1);
    }
}

//! Picks the main feature out of the titles that survived filtering.
//!
//! Every title is scored with a weighted sum of a few metrics, each divided
//! by the largest value of that metric on the disc. Duration dominates, so
//! titles much shorter than the longest one are dropped before scoring.

use crate::error::{Error, Result};
use crate::models::title_info::TitleInfo;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

pub const DURATION_WEIGHT: f64 = 0.81;
pub const DURATION_DEVIATION_WEIGHT: f64 = 0.052;
pub const SUBTITLE_WEIGHT: f64 = 0.089;
pub const AUDIO_WEIGHT: f64 = 0.071;
pub const CHAPTER_WEIGHT: f64 = 0.030;

/// Titles shorter than this share of the longest title are never the main
/// feature.
pub const MIN_DURATION_SHARE: f64 = 0.85;

/// Which end of the score ordering wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    /// Sort ascending and take the first title.
    #[default]
    LowestScore,
    HighestScore,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TitleMetric {
    pub title: u32,
    pub duration: u64,
    /// `-|expected - duration|` in seconds, when an expected runtime is known.
    pub duration_deviation: Option<f64>,
    pub chapters: u64,
    pub subtitle_streams: u64,
    pub audio_streams: u64,
}

impl TitleMetric {
    pub fn new(title: &TitleInfo, expected_runtime_seconds: Option<u64>) -> Result<Self> {
        let duration = title.duration_seconds()?;
        Ok(Self {
            title: title.id,
            duration,
            duration_deviation: expected_runtime_seconds
                .map(|expected| -(expected.abs_diff(duration) as f64)),
            chapters: title.chapters(),
            subtitle_streams: title.count_streams("subtitle") as u64,
            audio_streams: title.count_streams("audio") as u64,
        })
    }

    /// Metric values in the same order as the weights of [`weights`].
    fn values(&self) -> Vec<f64> {
        let mut values = vec![self.duration as f64];
        if let Some(deviation) = self.duration_deviation {
            values.push(deviation);
        }
        values.extend([
            self.subtitle_streams as f64,
            self.audio_streams as f64,
            self.chapters as f64,
        ]);
        values
    }
}

fn weights(with_deviation: bool) -> Vec<f64> {
    if with_deviation {
        vec![
            DURATION_WEIGHT,
            DURATION_DEVIATION_WEIGHT,
            SUBTITLE_WEIGHT,
            AUDIO_WEIGHT,
            CHAPTER_WEIGHT,
        ]
    } else {
        vec![DURATION_WEIGHT, SUBTITLE_WEIGHT, AUDIO_WEIGHT, CHAPTER_WEIGHT]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedTitle {
    pub metric: TitleMetric,
    pub score: f64,
}

pub fn title_metrics(
    titles: &BTreeMap<u32, TitleInfo>,
    expected_runtime_minutes: Option<u32>,
) -> Result<Vec<TitleMetric>> {
    if titles.is_empty() {
        return Err(Error::NoTitlesSurvived);
    }
    let expected = expected_runtime_minutes.map(|minutes| u64::from(minutes) * 60);
    let metrics = titles
        .values()
        .map(|title| TitleMetric::new(title, expected))
        .collect::<Result<Vec<_>>>()?;
    debug!("Created title metrics: {metrics:?}");
    Ok(metrics)
}

/// Scores and orders the titles, best candidate first.
pub fn rank_titles(
    titles: &BTreeMap<u32, TitleInfo>,
    expected_runtime_minutes: Option<u32>,
    selection: Selection,
) -> Result<Vec<RankedTitle>> {
    let metrics = title_metrics(titles, expected_runtime_minutes)?;
    let weights = weights(expected_runtime_minutes.is_some());

    // Largest of each metric, so we can normalize
    let max_of_field: Vec<f64> = (0..weights.len())
        .map(|i| {
            metrics
                .iter()
                .map(|metric| metric.values()[i])
                .fold(f64::NEG_INFINITY, f64::max)
        })
        .collect();

    let shortest_allowed = MIN_DURATION_SHARE * max_of_field[0];
    let max_of_field: Vec<f64> = max_of_field
        .into_iter()
        .map(|max| if max == 0.0 { 1.0 } else { max })
        .collect();
    let (kept, pruned): (Vec<TitleMetric>, Vec<TitleMetric>) = metrics
        .into_iter()
        .partition(|metric| metric.duration as f64 >= shortest_allowed);
    debug!(
        "Pruned titles shorter than {shortest_allowed}s: {:?}",
        pruned.iter().map(|metric| metric.title).collect::<Vec<_>>()
    );

    let mut ranked: Vec<RankedTitle> = kept
        .into_iter()
        .map(|metric| {
            let score = metric
                .values()
                .iter()
                .zip(&weights)
                .zip(&max_of_field)
                .map(|((value, weight), max)| value * weight / max)
                .sum();
            RankedTitle { metric, score }
        })
        .collect();

    ranked.sort_by(|a, b| {
        let by_score = a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal);
        let by_score = match selection {
            Selection::LowestScore => by_score,
            Selection::HighestScore => by_score.reverse(),
        };
        by_score.then(a.metric.title.cmp(&b.metric.title))
    });
    info!(
        "Ranked titles: {}",
        serde_json::to_string(&ranked).unwrap_or_default()
    );
    Ok(ranked)
}

/// Returns the index of the title most likely to be the main feature.
pub fn detect_main_feature(
    titles: &BTreeMap<u32, TitleInfo>,
    expected_runtime_minutes: Option<u32>,
    selection: Selection,
) -> Result<u32> {
    let ranked = rank_titles(titles, expected_runtime_minutes, selection)?;
    let main_feature = ranked
        .first()
        .map(|ranked| ranked.metric.title)
        .ok_or(Error::NoFeatureDetected)?;
    info!("Detected main feature: {main_feature}");
    Ok(main_feature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::mkv::{Attribute, ReportValue};

    struct Sample {
        id: u32,
        duration: &'static str,
        audio: u32,
        subtitles: u32,
        chapters: u64,
    }

    fn title(sample: Sample) -> TitleInfo {
        let mut title = TitleInfo::new(sample.id);
        title.set_field(
            Attribute::Duration,
            ReportValue::Text(sample.duration.to_string()),
        );
        title.set_field(Attribute::ChapterCount, ReportValue::Int(sample.chapters));
        let mut next = 0;
        for (count, type_) in [(sample.audio, "Audio"), (sample.subtitles, "Subtitles")] {
            for _ in 0..count {
                title
                    .stream_mut(next)
                    .set_field(Attribute::Type, ReportValue::Text(type_.to_string()));
                next += 1;
            }
        }
        title
    }

    fn titles(samples: Vec<Sample>) -> BTreeMap<u32, TitleInfo> {
        samples
            .into_iter()
            .map(|sample| (sample.id, title(sample)))
            .collect()
    }

    fn feature_and_cut() -> BTreeMap<u32, TitleInfo> {
        titles(vec![
            Sample { id: 0, duration: "1:30:00", audio: 2, subtitles: 1, chapters: 20 },
            Sample { id: 1, duration: "1:23:20", audio: 1, subtitles: 0, chapters: 10 },
        ])
    }

    #[test]
    fn test_short_titles_are_pruned_before_scoring() {
        let titles = titles(vec![
            Sample { id: 0, duration: "1:30:00", audio: 1, subtitles: 0, chapters: 0 },
            Sample { id: 1, duration: "1:23:20", audio: 1, subtitles: 0, chapters: 0 },
            Sample { id: 2, duration: "0:10:00", audio: 8, subtitles: 8, chapters: 99 },
        ]);

        let ranked = rank_titles(&titles, None, Selection::LowestScore).unwrap();

        let ids: Vec<u32> = ranked.iter().map(|r| r.metric.title).collect();
        assert_eq!(ids.len(), 2);
        assert!(!ids.contains(&2));
    }

    #[test]
    fn test_lowest_score_wins_by_default() {
        let ranked = rank_titles(&feature_and_cut(), None, Selection::default()).unwrap();

        assert_eq!(ranked[0].metric.title, 1);
        assert!((ranked[1].score - 1.0).abs() < 1e-9);
        let expected = 0.81 * 5000.0 / 5400.0 + 0.071 * 0.5 + 0.030 * 0.5;
        assert!((ranked[0].score - expected).abs() < 1e-9);
        assert_eq!(
            detect_main_feature(&feature_and_cut(), None, Selection::LowestScore).unwrap(),
            1
        );
    }

    #[test]
    fn test_highest_score_selection() {
        assert_eq!(
            detect_main_feature(&feature_and_cut(), None, Selection::HighestScore).unwrap(),
            0
        );
    }

    #[test]
    fn test_expected_runtime_adds_deviation_term() {
        // 84 minutes = 5040s: title 0 is 360s off, title 1 is 40s off
        let ranked = rank_titles(&feature_and_cut(), Some(84), Selection::LowestScore).unwrap();

        let cut = ranked.iter().find(|r| r.metric.title == 1).unwrap();
        assert_eq!(cut.metric.duration_deviation, Some(-40.0));
        let expected = 0.81 * 5000.0 / 5400.0 + 0.052 + 0.071 * 0.5 + 0.030 * 0.5;
        assert!((cut.score - expected).abs() < 1e-9);

        let feature = ranked.iter().find(|r| r.metric.title == 0).unwrap();
        assert!((feature.score - (1.0 + 0.052 * 9.0)).abs() < 1e-9);
    }

    #[test]
    fn test_zero_metrics_do_not_divide_by_zero() {
        let titles = titles(vec![
            Sample { id: 3, duration: "0:00:00", audio: 1, subtitles: 0, chapters: 0 },
            Sample { id: 5, duration: "0:00:00", audio: 1, subtitles: 0, chapters: 0 },
        ]);

        let ranked = rank_titles(&titles, None, Selection::LowestScore).unwrap();

        assert_eq!(ranked.len(), 2);
        assert!(ranked.iter().all(|r| r.score.is_finite()));
        // Equal scores fall back to the lower title index.
        assert_eq!(ranked[0].metric.title, 3);
    }

    #[test]
    fn test_exact_runtime_match_keeps_scores_finite() {
        let ranked = rank_titles(&feature_and_cut(), Some(90), Selection::LowestScore).unwrap();
        assert!(ranked.iter().all(|r| r.score.is_finite()));
    }

    #[test]
    fn test_no_titles() {
        let result = detect_main_feature(&BTreeMap::new(), None, Selection::LowestScore);
        assert!(matches!(result, Err(Error::NoTitlesSurvived)));
    }

    #[test]
    fn test_single_title_is_the_feature() {
        let titles = titles(vec![Sample { id: 7, duration: "0:45:00", audio: 1, subtitles: 0, chapters: 6 }]);
        assert_eq!(detect_main_feature(&titles, Some(44), Selection::LowestScore).unwrap(), 7);
    }

    #[test]
    fn test_malformed_duration_fails() {
        let titles = titles(vec![Sample { id: 0, duration: "90 minutes", audio: 1, subtitles: 0, chapters: 0 }]);
        assert!(matches!(
            detect_main_feature(&titles, None, Selection::LowestScore),
            Err(Error::Parse { .. })
        ));
    }

    #[test]
    fn test_selection_from_config_value() {
        #[derive(Deserialize)]
        struct Wrapper {
            selection: Selection,
        }
        let wrapper: Wrapper = toml::from_str("selection = \"highest_score\"").unwrap();
        assert_eq!(wrapper.selection, Selection::HighestScore);
    }
}

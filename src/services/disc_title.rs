use chrono::{DateTime, Local};
use log::{debug, error, info};
use regex::Regex;
use std::fs;
use std::path::Path;
use unicode_normalization::UnicodeNormalization;

lazy_static::lazy_static! {
    static ref BRACKETED: Regex = Regex::new(r"\[(.*?)]").expect("valid bracket regex");
    static ref WHITESPACE: Regex = Regex::new(r"\s+").expect("valid whitespace regex");
    static ref NOT_FILENAME: Regex = Regex::new(r"[^\w.() -]").expect("valid filename regex");
}

const BLU_RAY_SUFFIXES: [&str; 5] = [
    " - Blu-rayTM",
    " Blu-rayTM",
    " - BLU-RAYTM",
    " - BLU-RAY",
    " - Blu-ray",
];

/// Looks up how long a title is supposed to run, in minutes.
pub trait RuntimeLookup {
    fn expected_runtime(&self, title: &str, year: Option<&str>) -> Option<u32>;
}

/// For when there is no metadata source.
pub struct NoRuntimeLookup;

impl RuntimeLookup for NoRuntimeLookup {
    fn expected_runtime(&self, _title: &str, _year: Option<&str>) -> Option<u32> {
        None
    }
}

impl<F> RuntimeLookup for F
where
    F: Fn(&str, Option<&str>) -> Option<u32>,
{
    fn expected_runtime(&self, title: &str, year: Option<&str>) -> Option<u32> {
        self(title, year)
    }
}

/// Title and release year as far as the disc itself can tell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTitle {
    pub title: String,
    pub year: Option<String>,
}

/// Makes `string` safe to use as a file name: bracketed parts go, spaces
/// become hyphens and anything else odd is dropped.
pub fn clean_for_filename(string: &str) -> String {
    let string = BRACKETED.replace_all(string, "");
    let string = WHITESPACE.replace_all(&string, "-");
    let string = string
        .replace(" : ", " - ")
        .replace(':', "-")
        .replace('&', "and")
        .replace('\\', " - ")
        .trim()
        .to_string();
    NOT_FILENAME.replace_all(&string, "").to_string()
}

/// Folds accented letters to ASCII, drops whatever has no ASCII form and
/// strips the Blu-ray marketing suffixes studios like to put in disc titles.
pub fn normalize_disc_title(title: &str) -> String {
    let ascii: String = title.nfkd().filter(char::is_ascii).collect();
    BLU_RAY_SUFFIXES
        .iter()
        .fold(ascii, |title, suffix| title.replace(suffix, ""))
}

/// `THE_MATRIX` -> `The Matrix`
pub fn label_to_title(label: &str) -> String {
    let mut title = String::with_capacity(label.len());
    let mut previous_is_letter = false;
    for c in label.replace('_', " ").chars() {
        if previous_is_letter {
            title.extend(c.to_lowercase());
        } else {
            title.extend(c.to_uppercase());
        }
        previous_is_letter = c.is_alphabetic();
    }
    title
}

/// Text of `discinfo/title/name` in a `bdmt_eng.xml` file.
pub fn parse_bdmt_name(xml: &str) -> Option<String> {
    let document = match roxmltree::Document::parse(xml) {
        Ok(document) => document,
        Err(e) => {
            debug!("bdmt_eng.xml is not valid XML: {e}");
            return None;
        }
    };
    let name = document.descendants().find(|node| {
        node.has_tag_name("name")
            && node.parent_element().is_some_and(|title| {
                title.has_tag_name("title")
                    && title
                        .parent_element()
                        .is_some_and(|discinfo| discinfo.has_tag_name("discinfo"))
            })
    })?;
    let text: String = name
        .descendants()
        .filter(|node| node.is_text())
        .filter_map(|node| node.text())
        .collect();
    Some(text.trim().to_string())
}

/// Works out the title of the disc mounted at `device`.
///
/// Blu-rays carry their proper name in `BDMV/META/DL/bdmt_eng.xml`, and the
/// file's modification time is a decent guess at the release year. Anything
/// else falls back to the volume label.
pub fn read_title_from_device(device: &str, label: Option<&str>) -> LocalTitle {
    info!("Reading title from device...");
    let mut title = label_to_title(label.unwrap_or("unknown"));
    let mut year = None;

    let meta_path = Path::new(device).join("BDMV/META/DL/bdmt_eng.xml");
    match fs::read_to_string(&meta_path) {
        Ok(xml) => {
            year = fs::metadata(&meta_path)
                .and_then(|metadata| metadata.modified())
                .ok()
                .map(|modified| DateTime::<Local>::from(modified).format("%Y").to_string());
            match parse_bdmt_name(&xml) {
                Some(name) if !name.is_empty() => title = name,
                Some(_) => title = label.unwrap_or("unknown").to_string(),
                None => error!("Could not parse title from bdmt_eng.xml file."),
            }
        }
        Err(_) => error!("Disc is a Blu-ray, but bdmt_eng.xml could not be found."),
    }

    LocalTitle {
        title: normalize_disc_title(&title),
        year,
    }
}

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::disc_info::Disc;
use crate::models::mkv::RipEvent;
use crate::models::title_info::TitleInfo;
use crate::services::disc_title::{self, LocalTitle, RuntimeLookup};
use crate::services::main_feature::{self, Selection};
use crate::services::makemkvcon::MakeMkv;
use crate::services::process_manager::ProcessManager;
use crate::services::title_filter;
use crate::standard_error::StandardError;
use log::{debug, info};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Serialize, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionStatus {
    #[default]
    Idle,
    DiscRead,
    FeatureDetected,
    Extracting,
    Done,
    Failed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Idle => write!(f, "Idle"),
            SessionStatus::DiscRead => write!(f, "DiscRead"),
            SessionStatus::FeatureDetected => write!(f, "FeatureDetected"),
            SessionStatus::Extracting => write!(f, "Extracting"),
            SessionStatus::Done => write!(f, "Done"),
            SessionStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// Rips the main feature off one disc.
///
/// `read_disc_properties` -> `detect_main_feature` -> `rip_main_feature`,
/// in that order. An error that leaves nothing to retry moves the session
/// to [`SessionStatus::Failed`].
pub struct RipSession {
    makemkv: MakeMkv,
    languages: Vec<String>,
    selection: Selection,
    rip_dir: PathBuf,
    status: SessionStatus,
    disc: Disc,
    titles: BTreeMap<u32, TitleInfo>,
    local_title: Option<LocalTitle>,
    main_feature: Option<u32>,
    progress: f64,
    message: Option<String>,
    error: Option<StandardError>,
}

impl RipSession {
    pub fn new(config: &Config, processes: ProcessManager) -> Self {
        Self {
            makemkv: MakeMkv::new(config, processes),
            languages: config.output.languages.clone(),
            selection: config.ranking.selection,
            rip_dir: config.output.temporary_rip_dir.clone(),
            status: SessionStatus::Idle,
            disc: Disc::default(),
            titles: BTreeMap::new(),
            local_title: None,
            main_feature: None,
            progress: 0.0,
            message: None,
            error: None,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn disc(&self) -> &Disc {
        &self.disc
    }

    /// Titles left after dropping the ones without audio in a wanted language.
    pub fn titles(&self) -> &BTreeMap<u32, TitleInfo> {
        &self.titles
    }

    pub fn local_title(&self) -> Option<&LocalTitle> {
        self.local_title.as_ref()
    }

    /// Progress of the running extraction, between 0 and 1.
    pub fn progress(&self) -> f64 {
        self.progress
    }

    /// Last message makemkvcon printed while extracting.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// What went wrong, once the session failed.
    pub fn error(&self) -> Option<&StandardError> {
        self.error.as_ref()
    }

    fn expect_status(&self, expected: SessionStatus, operation: &str) -> Result<()> {
        if self.status != expected {
            return Err(Error::InvalidState(format!(
                "cannot {operation} while {}, expected {expected}",
                self.status
            )));
        }
        Ok(())
    }

    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_unrecoverable() {
                debug!("Session failed while {}: {e}", self.status);
                self.status = SessionStatus::Failed;
                self.error = Some(StandardError::from(e));
            }
        }
        result
    }

    /// Reads the disc report and keeps the titles with audio in one of the
    /// configured languages.
    pub fn read_disc_properties(&mut self) -> Result<()> {
        self.expect_status(SessionStatus::Idle, "read disc properties")?;
        let disc_info = self.makemkv.read_disc_properties();
        let disc_info = self.track(disc_info)?;

        info!("Filtering out unwanted streams...");
        self.titles = title_filter::filter_titles(&disc_info.titles, &self.languages);
        self.local_title = Some(disc_title::read_title_from_device(
            self.makemkv.device(),
            disc_info.disc.label().as_deref(),
        ));
        self.disc = disc_info.disc;
        self.status = SessionStatus::DiscRead;
        Ok(())
    }

    /// Picks the main feature, asking `lookup` how long it should run.
    pub fn detect_main_feature(&mut self, lookup: &dyn RuntimeLookup) -> Result<u32> {
        self.expect_status(SessionStatus::DiscRead, "detect the main feature")?;
        info!("Detecting main feature...");
        let expected_runtime = self.local_title.as_ref().and_then(|local| {
            lookup.expected_runtime(&local.title, local.year.as_deref())
        });
        match expected_runtime {
            Some(minutes) => info!("Expected runtime is {minutes} minutes"),
            None => info!("No expected runtime, ranking without it"),
        }

        let detected =
            main_feature::detect_main_feature(&self.titles, expected_runtime, self.selection);
        let main_feature = self.track(detected)?;
        self.main_feature = Some(main_feature);
        self.status = SessionStatus::FeatureDetected;
        Ok(main_feature)
    }

    /// Index and details of the detected main feature.
    pub fn main_feature(&self) -> Result<(u32, &TitleInfo)> {
        let id = self.main_feature.ok_or(Error::NoFeatureDetected)?;
        let title = self.titles.get(&id).ok_or(Error::NoFeatureDetected)?;
        Ok((id, title))
    }

    /// Directory the main feature is extracted into.
    pub fn output_dir(&self) -> PathBuf {
        let name = self
            .local_title
            .as_ref()
            .map(|local| disc_title::clean_for_filename(&local.title))
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "unknown".to_string());
        self.rip_dir.join(name)
    }

    /// Extracts the main feature, forwarding every progress event to
    /// `on_event`. Returns the directory the file was written to.
    pub fn rip_main_feature(&mut self, on_event: &mut dyn FnMut(&RipEvent)) -> Result<PathBuf> {
        let (title, _) = self.main_feature()?;
        self.expect_status(SessionStatus::FeatureDetected, "rip the main feature")?;
        let output_dir = self.output_dir();
        self.status = SessionStatus::Extracting;
        info!("Ripping title {title} to {}", output_dir.display());

        let progress = &mut self.progress;
        let message = &mut self.message;
        let mut track_event = |event: &RipEvent| {
            match event {
                RipEvent::Progress(prgv) => *progress = prgv.fraction(),
                RipEvent::Message(msg) => *message = Some(msg.message.clone()),
                RipEvent::TotalTitle(_) | RipEvent::CurrentTitle(_) => {}
            }
            on_event(event);
        };
        let ripped = self.makemkv.rip_title(title, &output_dir, &mut track_event);
        self.track(ripped)?;

        self.status = SessionStatus::Done;
        Ok(output_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::disc_title::NoRuntimeLookup;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    // Title 0: the feature with English audio and subtitles
    // Title 1: the feature with Japanese audio only
    // Title 2: an English trailer
    // Title 3: a slightly shorter English cut
    const REPORT: &str = r#"MSG:1005,0,1,"MakeMKV v1.17.7 linux(x64-release) started","%1 started","MakeMKV v1.17.7 linux(x64-release)"
DRV:0,2,999,12,"BD-RE HL-DT-ST BD-RE  WH16NS60 1.02","TEST_DISC","/dev/sr0"
TCOUNT:4
CINFO:1,6209,"Blu-ray disc"
CINFO:2,0,"TEST_DISC"
TINFO:0,2,0,"Test Disc"
TINFO:0,8,0,"20"
TINFO:0,9,0,"1:30:00"
TINFO:0,10,0,"25.1 GB"
SINFO:0,0,1,6201,"Video"
SINFO:0,0,19,0,"1920x1080"
SINFO:0,1,1,6202,"Audio"
SINFO:0,1,3,0,"eng"
SINFO:0,1,4,0,"English"
SINFO:0,2,1,6203,"Subtitles"
SINFO:0,2,3,0,"eng"
TINFO:1,8,0,"0"
TINFO:1,9,0,"1:30:00"
SINFO:1,0,1,6201,"Video"
SINFO:1,1,1,6202,"Audio"
SINFO:1,1,3,0,"jpn"
TINFO:2,8,0,"1"
TINFO:2,9,0,"0:05:00"
SINFO:2,0,1,6202,"Audio"
SINFO:2,0,3,0,"eng"
TINFO:3,8,0,"16"
TINFO:3,9,0,"1:28:00"
SINFO:3,0,1,6201,"Video"
SINFO:3,1,1,6202,"Audio"
SINFO:3,1,3,0,"eng"
"#;

    fn config(dir: &Path, languages: &str, selection: &str) -> Config {
        let toml = format!(
            r#"
[input]
devices = ["{dir}"]
read_from_log = true
makemkvcon = "{dir}/makemkvcon"

[output]
languages = {languages}
logging_dir = "{dir}/logs"
temporary_rip_dir = "{dir}/rips"
output_dir = "{dir}/media"

[ranking]
selection = "{selection}"
"#,
            dir = dir.display()
        );
        fs::create_dir_all(dir.join("logs")).unwrap();
        fs::write(dir.join("logs/stdout.log"), REPORT).unwrap();
        Config::from_toml_str(&toml).unwrap()
    }

    fn session(dir: &Path, languages: &str, selection: &str) -> RipSession {
        RipSession::new(&config(dir, languages, selection), ProcessManager::new())
    }

    #[test]
    fn test_english_only() {
        let dir = TempDir::new().unwrap();
        let mut session = session(dir.path(), r#"["eng"]"#, "lowest_score");

        session.read_disc_properties().unwrap();
        assert_eq!(session.status(), SessionStatus::DiscRead);
        assert_eq!(session.titles().keys().copied().collect::<Vec<_>>(), vec![0, 2, 3]);
        assert_eq!(session.disc().label().as_deref(), Some("TEST_DISC"));
        assert_eq!(session.local_title().unwrap().title, "Test Disc");

        assert_eq!(session.detect_main_feature(&NoRuntimeLookup).unwrap(), 3);
        assert_eq!(session.status(), SessionStatus::FeatureDetected);
        let (id, title) = session.main_feature().unwrap();
        assert_eq!(id, 3);
        assert_eq!(title.chapters(), 16);
    }

    #[test]
    fn test_english_only_highest_score() {
        let dir = TempDir::new().unwrap();
        let mut session = session(dir.path(), r#"["eng"]"#, "highest_score");

        session.read_disc_properties().unwrap();
        assert_eq!(session.detect_main_feature(&NoRuntimeLookup).unwrap(), 0);
    }

    #[test]
    fn test_english_and_japanese() {
        let dir = TempDir::new().unwrap();
        let mut session = session(dir.path(), r#"["eng", "jpn"]"#, "lowest_score");

        session.read_disc_properties().unwrap();
        assert_eq!(
            session.titles().keys().copied().collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
        assert_eq!(session.detect_main_feature(&NoRuntimeLookup).unwrap(), 1);
    }

    #[test]
    fn test_runtime_lookup_gets_local_title() {
        let dir = TempDir::new().unwrap();
        let mut session = session(dir.path(), r#"["eng"]"#, "lowest_score");
        session.read_disc_properties().unwrap();

        let asked = std::cell::RefCell::new(None);
        let lookup = |title: &str, year: Option<&str>| {
            *asked.borrow_mut() = Some((title.to_string(), year.map(str::to_string)));
            Some(90u32)
        };
        session.detect_main_feature(&lookup).unwrap();

        assert_eq!(*asked.borrow(), Some(("Test Disc".to_string(), None)));
    }

    #[test]
    fn test_main_feature_before_detection() {
        let dir = TempDir::new().unwrap();
        let mut session = session(dir.path(), r#"["eng"]"#, "lowest_score");
        assert!(matches!(session.main_feature(), Err(Error::NoFeatureDetected)));

        session.read_disc_properties().unwrap();
        assert!(matches!(session.main_feature(), Err(Error::NoFeatureDetected)));
        assert!(matches!(
            session.rip_main_feature(&mut |_| {}),
            Err(Error::NoFeatureDetected)
        ));
        assert_eq!(session.status(), SessionStatus::DiscRead);
    }

    #[test]
    fn test_wrong_order_is_invalid_state() {
        let dir = TempDir::new().unwrap();
        let mut session = session(dir.path(), r#"["eng"]"#, "lowest_score");

        assert!(matches!(
            session.detect_main_feature(&NoRuntimeLookup),
            Err(Error::InvalidState(_))
        ));
        assert_eq!(session.status(), SessionStatus::Idle);

        session.read_disc_properties().unwrap();
        assert!(matches!(
            session.read_disc_properties(),
            Err(Error::InvalidState(_))
        ));
        assert_eq!(session.status(), SessionStatus::DiscRead);
    }

    #[test]
    fn test_no_titles_survive() {
        let dir = TempDir::new().unwrap();
        let mut session = session(dir.path(), r#"["fra"]"#, "lowest_score");

        session.read_disc_properties().unwrap();
        assert!(session.titles().is_empty());
        assert!(matches!(
            session.detect_main_feature(&NoRuntimeLookup),
            Err(Error::NoTitlesSurvived)
        ));
        assert_eq!(session.status(), SessionStatus::Failed);
        assert_eq!(session.error().unwrap().title, "No usable titles");
    }

    #[test]
    fn test_missing_report_fails_session() {
        let dir = TempDir::new().unwrap();
        let mut session = session(dir.path(), r#"["eng"]"#, "lowest_score");
        fs::remove_file(dir.path().join("logs/stdout.log")).unwrap();

        assert!(matches!(session.read_disc_properties(), Err(Error::Io(_))));
        assert_eq!(session.status(), SessionStatus::Failed);
    }

    #[cfg(unix)]
    fn fake_makemkvcon(dir: &Path, body: &str) {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("makemkvcon");
        fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_rip_main_feature() {
        let dir = TempDir::new().unwrap();
        fake_makemkvcon(
            dir.path(),
            r#"echo 'PRGV:0,0,65536'
echo 'MSG:5036,0,1,"Copy complete. 1 titles saved.","Copy complete. %1 titles saved.","1"'
echo 'PRGV:65536,32768,65536'
echo "$6" > "$7/title"
"#,
        );
        let mut session = session(dir.path(), r#"["eng"]"#, "lowest_score");
        session.read_disc_properties().unwrap();
        session.detect_main_feature(&NoRuntimeLookup).unwrap();

        let mut events = 0;
        let output_dir = session.rip_main_feature(&mut |_| events += 1).unwrap();

        assert_eq!(output_dir, dir.path().join("rips/Test-Disc"));
        assert_eq!(fs::read_to_string(output_dir.join("title")).unwrap(), "3\n");
        assert_eq!(events, 3);
        assert_eq!(session.status(), SessionStatus::Done);
        assert!((session.progress() - 0.5).abs() < 1e-9);
        assert_eq!(session.message(), Some("Copy complete. 1 titles saved."));
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_rip() {
        let dir = TempDir::new().unwrap();
        fake_makemkvcon(dir.path(), "echo 'drive error' >&2\nexit 3\n");
        let mut session = session(dir.path(), r#"["eng"]"#, "lowest_score");
        session.read_disc_properties().unwrap();
        session.detect_main_feature(&NoRuntimeLookup).unwrap();

        let result = session.rip_main_feature(&mut |_| {});

        assert!(matches!(result, Err(Error::ToolFailed { code: 3, .. })));
        assert_eq!(session.status(), SessionStatus::Failed);
        let error = session.error().unwrap();
        assert!(error.message.contains("drive error"));
    }
}

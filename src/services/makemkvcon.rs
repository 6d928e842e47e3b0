use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::disc_info::DiscInfo;
use crate::models::mkv::{RipEvent, MSG};
use crate::services::makemkvcon_parser;
use crate::services::process_manager::{ProcessManager, ProcessOutput};
use log::{debug, error, info};
use std::fs;
use std::path::{Path, PathBuf};

#[cfg(all(target_os = "windows", target_pointer_width = "64"))]
const MAKEMKVCON: &str = "makemkvcon64";

#[cfg(not(all(target_os = "windows", target_pointer_width = "64")))]
const MAKEMKVCON: &str = "makemkvcon";

// makemkvcon [options] Command Parameters
// https://www.makemkv.com/developers/usage.txt
//
// -r, --robot enables automation mode: line based output, all strings quoted
// with control characters and quotes backslash escaped.
// --messages=-stdout sends messages to stdout, --progress=-same puts the
// progress lines in the same stream, so it has to follow --messages.
//
// Disc information (info command):
//   CINFO:id,code,value
//   TINFO:title,id,code,value
//   SINFO:title,stream,id,code,value
// Progress (mkv command):
//   PRGV:current,total,max
//   PRGT:code,id,name / PRGC:code,id,name
//   MSG:code,flags,count,message,format,param0,param1,...

#[derive(Debug, Clone, Default)]
pub struct RunResults {
    pub messages: Vec<MSG>,
}

impl RunResults {
    fn err_summary(&self) -> Option<&MSG> {
        self.messages
            .iter()
            .find(|message| message.code == MSG::FAILURE_SUMMARY)
    }
}

/// Runs makemkvcon against the configured drive.
#[derive(Debug, Clone)]
pub struct MakeMkv {
    processes: ProcessManager,
    program: String,
    device: String,
    read_from_log: bool,
    stdout_log: PathBuf,
}

impl MakeMkv {
    pub fn new(config: &Config, processes: ProcessManager) -> Self {
        Self {
            processes,
            program: config
                .input
                .makemkvcon
                .clone()
                .unwrap_or_else(|| MAKEMKVCON.to_string()),
            device: config.device().to_string(),
            read_from_log: config.input.read_from_log,
            stdout_log: config.stdout_log(),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    fn disc_arg(&self) -> String {
        format!("dev:{}", self.device)
    }

    pub fn info_args(&self) -> Vec<String> {
        vec!["-r".to_string(), "info".to_string(), self.disc_arg()]
    }

    pub fn rip_args(&self, title: u32, output_dir: &Path) -> Vec<String> {
        vec![
            "--messages=-stdout".to_string(),
            "--progress=-same".to_string(),
            "-r".to_string(),
            "mkv".to_string(),
            self.disc_arg(),
            title.to_string(),
            output_dir.to_string_lossy().to_string(),
        ]
    }

    /// Raw `info` report of the disc. The report is saved to `stdout.log` in
    /// the logging dir, which is also where it is read from when replaying.
    pub fn read_disc_report(&self) -> Result<String> {
        if self.read_from_log {
            info!("Reading disc report from {}", self.stdout_log.display());
            return Ok(fs::read_to_string(&self.stdout_log)?);
        }

        let mut log_line = |line: &str| debug!("{line}");
        let output = self
            .processes
            .call(&self.program, &self.info_args(), Some(&mut log_line))?;
        if !output.success() {
            error!("Could not acquire blu-ray title info from {}", self.device);
            error!("{} output:\n{}", self.program, output.stderr);
            return Err(self.failure(&output, output.stderr.clone()));
        }

        if let Some(logging_dir) = self.stdout_log.parent() {
            fs::create_dir_all(logging_dir)?;
        }
        fs::write(&self.stdout_log, &output.stdout)?;
        Ok(output.stdout)
    }

    pub fn read_disc_properties(&self) -> Result<DiscInfo> {
        info!("Reading disc properties from {}...", self.device);
        let report = self.read_disc_report()?;
        let disc_info = makemkvcon_parser::parse_disc_info(&report)?;
        info!(
            "Successfully read disc properties: {}",
            serde_json::to_string(&disc_info.disc).unwrap_or_default()
        );
        info!(
            "Successfully read title properties: {}",
            serde_json::to_string(&disc_info.titles).unwrap_or_default()
        );
        Ok(disc_info)
    }

    /// Extracts `title` into `output_dir`, handing every progress line to
    /// `on_event` as it arrives.
    pub fn rip_title(
        &self,
        title: u32,
        output_dir: &Path,
        on_event: &mut dyn FnMut(&RipEvent),
    ) -> Result<RunResults> {
        fs::create_dir_all(output_dir)?;
        let mut run_results = RunResults::default();
        let mut sink = |line: &str| {
            debug!("{line}");
            if let Some(event) = makemkvcon_parser::parse_progress_line(line) {
                if let RipEvent::Message(msg) = &event {
                    run_results.messages.push(msg.clone());
                }
                on_event(&event);
            }
        };
        let output = self.processes.call(
            &self.program,
            &self.rip_args(title, output_dir),
            Some(&mut sink),
        )?;

        if !output.success() {
            error!("Ripping title {title} from {} failed", self.device);
            error!("{} output:\n{}", self.program, output.stderr);
            return Err(self.failure(&output, output.stderr.clone()));
        }
        if let Some(err_summary) = run_results.err_summary() {
            error!("{}", err_summary.message);
            return Err(self.failure(&output, err_summary.message.clone()));
        }
        info!("Ripped title {title} to {}", output_dir.display());
        Ok(run_results)
    }

    fn failure(&self, output: &ProcessOutput, stderr: String) -> Error {
        Error::tool_failed(&self.program, output.code(), stderr)
    }
}

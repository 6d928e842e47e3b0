use crate::error::{Error, Result};
use crate::models::disc_info::DiscInfo;
use crate::models::mkv::{Attribute, ProgressTitle, ReportValue, RipEvent, MSG, PRGV};
use log::debug;

/// Splits one robot mode line into its fields.
///
/// Strings are double quoted with backslash escaped quotes, so a comma
/// inside a disc or title name does not start a new field.
fn split_fields(line: &str) -> std::result::Result<Vec<String>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .double_quote(false)
        .escape(Some(b'\\'))
        .from_reader(line.as_bytes());

    match reader.records().next() {
        Some(record) => Ok(record?.iter().map(str::to_string).collect()),
        None => Ok(Vec::new()),
    }
}

type Record = (String, Vec<ReportValue>);

/// Splits a line into its tag and positional values. The first field looks
/// like `TINFO:2`; everything after the first colon is the first value.
fn tag_and_values(line: &str) -> std::result::Result<Option<Record>, csv::Error> {
    let fields = split_fields(line)?;
    let Some((first, rest)) = fields.split_first() else {
        return Ok(None);
    };

    let (tag, first_value) = match first.split_once(':') {
        Some((tag, value)) => (tag, Some(value)),
        None => (first.as_str(), None),
    };
    let values = first_value
        .into_iter()
        .chain(rest.iter().map(String::as_str))
        .map(ReportValue::coerce)
        .collect();
    Ok(Some((tag.to_string(), values)))
}

fn require(tag: &str, values: &[ReportValue], count: usize, line_number: usize) -> Result<()> {
    if values.len() < count {
        return Err(Error::parse_error(format!(
            "line {line_number}: {tag} needs {count} values, got {}",
            values.len()
        )));
    }
    Ok(())
}

fn index(value: &ReportValue, what: &str, line_number: usize) -> Result<u32> {
    value
        .as_int()
        .and_then(|number| u32::try_from(number).ok())
        .ok_or_else(|| {
            Error::parse_error(format!("line {line_number}: {what} index {value:?} is not an index"))
        })
}

fn attribute(value: &ReportValue) -> Option<Attribute> {
    value.as_int().and_then(Attribute::from_code)
}

/// Parses the output of `makemkvcon -r info` into a disc and its titles.
///
/// Record types other than CINFO, TINFO and SINFO are skipped, as are
/// attribute codes that [`Attribute`] doesn't know. A known record with too
/// few fields means the output format changed and is an error.
pub fn parse_disc_info(report: &str) -> Result<DiscInfo> {
    let mut disc_info = DiscInfo::default();

    for (offset, line) in report.lines().enumerate() {
        let line_number = offset + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((tag, values)) = tag_and_values(line)
            .map_err(|e| Error::parse_error(format!("line {line_number}: {e}")))?
        else {
            continue;
        };

        match tag.as_str() {
            // CINFO:id,code,value
            "CINFO" => {
                require(&tag, &values, 3, line_number)?;
                if let Some(attribute) = attribute(&values[0]) {
                    disc_info.disc.set_field(attribute, values[2].clone());
                }
            }
            // TINFO:title,id,code,value
            "TINFO" => {
                require(&tag, &values, 4, line_number)?;
                let title = index(&values[0], "title", line_number)?;
                let title_info = disc_info.title_mut(title);
                if let Some(attribute) = attribute(&values[1]) {
                    title_info.set_field(attribute, values[3].clone());
                }
            }
            // SINFO:title,stream,id,code,value
            "SINFO" => {
                require(&tag, &values, 5, line_number)?;
                let title = index(&values[0], "title", line_number)?;
                let stream = index(&values[1], "stream", line_number)?;
                let stream_info = disc_info.title_mut(title).stream_mut(stream);
                if let Some(attribute) = attribute(&values[2]) {
                    stream_info.set_field(attribute, values[4].clone());
                }
            }
            _ => {}
        }
    }

    Ok(disc_info)
}

fn int_at(values: &[ReportValue], position: usize) -> Option<u64> {
    values.get(position).and_then(ReportValue::as_int)
}

fn text_at(values: &[ReportValue], position: usize) -> Option<String> {
    values.get(position).map(ReportValue::to_string)
}

fn progress_title(values: &[ReportValue]) -> Option<ProgressTitle> {
    Some(ProgressTitle {
        code: int_at(values, 0)?,
        id: int_at(values, 1)?,
        name: text_at(values, 2)?,
    })
}

/// Turns one line of `makemkvcon mkv --progress=-same` output into a
/// [`RipEvent`]. Anything else, including malformed progress lines, yields
/// `None`.
pub fn parse_progress_line(line: &str) -> Option<RipEvent> {
    let (tag, values) = match tag_and_values(line.trim()) {
        Ok(Some(parsed)) => parsed,
        Ok(None) => return None,
        Err(e) => {
            debug!("Skipping unreadable progress line {line:?}: {e}");
            return None;
        }
    };

    let event = match tag.as_str() {
        "PRGV" => Some(RipEvent::Progress(PRGV {
            current: int_at(&values, 0)?,
            total: int_at(&values, 1)?,
            pmax: int_at(&values, 2)?,
        })),
        "PRGT" => progress_title(&values).map(RipEvent::TotalTitle),
        "PRGC" => progress_title(&values).map(RipEvent::CurrentTitle),
        "MSG" => Some(RipEvent::Message(MSG {
            code: int_at(&values, 0)?,
            flags: int_at(&values, 1)?,
            mcount: int_at(&values, 2)?,
            message: text_at(&values, 3)?,
            format: text_at(&values, 4).unwrap_or_default(),
            params: values.iter().skip(5).map(ReportValue::to_string).collect(),
        })),
        _ => return None,
    };

    if event.is_none() {
        debug!("Skipping malformed {tag} line {line:?}");
    }
    event
}

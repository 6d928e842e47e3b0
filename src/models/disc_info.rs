use crate::models::mkv::{Attribute, ReportValue};
use crate::models::title_info::TitleInfo;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Disc {
    #[serde(rename = "type")]
    pub type_: Option<ReportValue>,
    pub name: Option<ReportValue>,
}

impl Disc {
    pub fn set_field(&mut self, attribute: Attribute, value: ReportValue) -> bool {
        let field = match attribute {
            Attribute::Type => &mut self.type_,
            Attribute::Name => &mut self.name,
            _ => return false,
        };
        *field = Some(value);
        true
    }

    /// Raw disc label, e.g. `THE_MATRIX`.
    pub fn label(&self) -> Option<String> {
        self.name.as_ref().map(ReportValue::to_string)
    }
}

/// Everything one `makemkvcon info` run reports about a disc.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiscInfo {
    pub disc: Disc,
    pub titles: BTreeMap<u32, TitleInfo>,
}

impl DiscInfo {
    pub fn title_mut(&mut self, id: u32) -> &mut TitleInfo {
        self.titles.entry(id).or_insert_with(|| TitleInfo::new(id))
    }
}

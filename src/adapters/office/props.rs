//! `docProps/core.xml` read and write with quick-xml.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeDelta, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::io::Cursor;

use crate::metadata::Fields;

const NS_CP: &str = "http://schemas.openxmlformats.org/package/2006/metadata/core-properties";
const NS_DC: &str = "http://purl.org/dc/elements/1.1/";
const NS_DCTERMS: &str = "http://purl.org/dc/terms/";
const NS_DCMITYPE: &str = "http://purl.org/dc/dcmitype/";
const NS_XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Field name to qualified element name, in display order.
pub(crate) const PROPERTIES: &[(&str, &str)] = &[
    ("title", "dc:title"),
    ("author", "dc:creator"),
    ("subject", "dc:subject"),
    ("keywords", "cp:keywords"),
    ("comments", "dc:description"),
    ("last_modified_by", "cp:lastModifiedBy"),
    ("created", "dcterms:created"),
    ("modified", "dcterms:modified"),
    ("category", "cp:category"),
    ("content_status", "cp:contentStatus"),
    ("identifier", "dc:identifier"),
    ("language", "dc:language"),
    ("revision", "cp:revision"),
    ("version", "cp:version"),
];

fn local_name(qname: &str) -> &str {
    qname.rsplit(':').next().unwrap_or(qname)
}

fn is_timestamp(field: &str) -> bool {
    matches!(field, "created" | "modified")
}

/// Core properties of an OPC package, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoreProperties {
    values: Fields<String>,
}

impl CoreProperties {
    /// Parse a core properties part. Elements are matched by local name so
    /// unusual namespace prefixes still resolve.
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        let mut props = Self::default();
        let mut current: Option<&'static str> = None;

        loop {
            match reader.read_event().context("Malformed core properties XML")? {
                Event::Start(e) => {
                    let name = e.local_name();
                    current = PROPERTIES
                        .iter()
                        .find(|(_, qname)| local_name(qname).as_bytes() == name.as_ref())
                        .map(|(field, _)| *field);
                }
                Event::Text(t) => {
                    if let Some(field) = current {
                        let text = t.unescape().context("Bad entity in core properties")?;
                        let mut value = props.get(field).unwrap_or_default().to_string();
                        value.push_str(&text);
                        props.values.insert(field, value);
                    }
                }
                Event::End(_) => current = None,
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(props)
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.values.get(field).map(String::as_str)
    }

    pub fn set(&mut self, field: &str, value: impl Into<String>) {
        self.values.insert(field, value.into());
    }

    /// Stamp `modified` with the current UTC time to the millisecond. The new
    /// value is always later than the one it replaces.
    pub fn touch_modified(&mut self) {
        let mut now = Utc::now();
        let previous = self
            .get("modified")
            .and_then(|raw| DateTime::parse_from_rfc3339(raw.trim()).ok());
        if let Some(previous) = previous {
            let floor = previous.with_timezone(&Utc) + TimeDelta::milliseconds(1);
            if now < floor {
                now = floor;
            }
        }
        let stamp = now.to_rfc3339_opts(SecondsFormat::Millis, true);
        log::debug!("  modified: {stamp}");
        self.set("modified", stamp);
    }

    /// A timestamp field normalized to RFC 3339 in UTC, or the raw text when it
    /// does not parse. Fractional seconds are kept when present.
    pub fn timestamp(&self, field: &str) -> Option<String> {
        let raw = self.get(field)?.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::AutoSi, true));
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
            return Some(dt.and_utc().to_rfc3339_opts(SecondsFormat::AutoSi, true));
        }
        Some(raw.to_string())
    }

    /// Serialize to a complete core properties part.
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;

        let root = BytesStart::new("cp:coreProperties").with_attributes([
            ("xmlns:cp", NS_CP),
            ("xmlns:dc", NS_DC),
            ("xmlns:dcterms", NS_DCTERMS),
            ("xmlns:dcmitype", NS_DCMITYPE),
            ("xmlns:xsi", NS_XSI),
        ]);
        writer.write_event(Event::Start(root))?;

        for (field, qname) in PROPERTIES {
            let Some(value) = self.get(field) else { continue };
            let mut start = BytesStart::new(*qname);
            if is_timestamp(field) {
                start.push_attribute(("xsi:type", "dcterms:W3CDTF"));
            }
            writer.write_event(Event::Start(start))?;
            writer.write_event(Event::Text(BytesText::new(value)))?;
            writer.write_event(Event::End(BytesEnd::new(*qname)))?;
        }

        writer.write_event(Event::End(BytesEnd::new("cp:coreProperties")))?;
        String::from_utf8(writer.into_inner().into_inner()).context("Core properties are not UTF-8")
    }
}

//! XML utilities for SpreadsheetML parts: a pull reader tuned for worksheet parsing,
//! attribute/text helpers, and a small writer used to emit the master workbook.

use crate::error::SheetMapperError;
use quick_xml::escape::resolve_xml_entity;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::BytesDecl;
use quick_xml::events::BytesEnd;
use quick_xml::events::BytesRef;
use quick_xml::events::BytesStart;
use quick_xml::events::BytesText;
use quick_xml::events::Event;
use quick_xml::Reader;
use quick_xml::Writer;
use std::borrow::Cow;
use std::io::BufRead;
use std::io::Write;
use thiserror::Error;

/// Errors specific to XML parsing operations
#[derive(Error, Debug)]
pub enum XmlError {
    #[error("Parse entity '{0}' failed")]
    ParseEntityError(String),
}

/// XML reader wrapper configured for spreadsheet parsing
pub(crate) struct XmlReader<R: BufRead> {
    reader: Reader<R>,
    buffer: Vec<u8>,
}

impl<R: BufRead> XmlReader<R> {
    pub(crate) fn new(buf_reader: R) -> XmlReader<R> {
        let mut reader = Reader::from_reader(buf_reader);
        let config = reader.config_mut();
        config.check_comments = false;
        config.check_end_names = false;
        config.expand_empty_elements = true;
        config.trim_text(false);

        let buffer = Vec::with_capacity(1024);
        XmlReader { reader, buffer }
    }

    /// Reads the next XML event, `None` at end of document
    pub(crate) fn next(&'_ mut self) -> Result<Option<Event<'_>>, SheetMapperError> {
        self.buffer.clear();
        match self.reader.read_event_into(&mut self.buffer) {
            Ok(Event::Eof) => Ok(None),
            Ok(event) => Ok(Some(event)),
            Err(error) => Err(SheetMapperError::XmlError(error)),
        }
    }
}

/// Helper trait for XML nodes providing attribute access
pub(crate) trait XmlNodeHelper<'a> {
    /// Gets an unescaped attribute value by name
    fn get_attribute_value(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, SheetMapperError>;
}

impl<'a> XmlNodeHelper<'a> for BytesStart<'a> {
    fn get_attribute_value(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, SheetMapperError> {
        self.try_get_attribute(name)?
            .map(|attribute: Attribute<'a>| -> Result<Cow<'a, str>, SheetMapperError> {
                Ok(attribute.unescape_value()?)
            })
            .transpose()
    }
}

/// Helper trait for building text content from XML events
pub(crate) trait XmlTextContextHelper {
    /// Appends an entity or character reference (`&amp;`, `&#233;`, `&#xE9;`)
    fn push_bytes_ref(&mut self, bytes: &BytesRef) -> Result<(), SheetMapperError>;
}

impl XmlTextContextHelper for String {
    fn push_bytes_ref(&mut self, bytes: &BytesRef) -> Result<(), SheetMapperError> {
        let raw = bytes.xml_content()?;
        if let Some(number) = raw.strip_prefix('#') {
            let code = if let Some(hex) = number.strip_prefix('x') {
                u32::from_str_radix(hex, 16)?
            } else {
                number.parse::<u32>()?
            };
            if let Some(character) = char::from_u32(code) {
                self.push(character);
            }
        } else if let Some(entity) = resolve_xml_entity(&raw) {
            self.push_str(entity);
        } else {
            Err(XmlError::ParseEntityError(raw.to_string()))?;
        }
        Ok(())
    }
}

/// Thin wrapper over `quick_xml::Writer` for emitting small XML parts
pub(crate) struct XmlWriter<W: Write> {
    writer: Writer<W>,
}

impl<W: Write> XmlWriter<W> {
    /// Starts a standalone UTF-8 document
    pub(crate) fn new(inner: W) -> Result<XmlWriter<W>, SheetMapperError> {
        let mut writer = Writer::new(inner);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
        Ok(XmlWriter { writer })
    }

    pub(crate) fn start(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), SheetMapperError> {
        let element = BytesStart::new(name).with_attributes(attributes.iter().copied());
        self.writer.write_event(Event::Start(element))?;
        Ok(())
    }

    pub(crate) fn end(&mut self, name: &str) -> Result<(), SheetMapperError> {
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    /// Writes `<name attributes/>`
    pub(crate) fn empty(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), SheetMapperError> {
        let element = BytesStart::new(name).with_attributes(attributes.iter().copied());
        self.writer.write_event(Event::Empty(element))?;
        Ok(())
    }

    /// Writes escaped character data
    pub(crate) fn text(&mut self, text: &str) -> Result<(), SheetMapperError> {
        self.writer.write_event(Event::Text(BytesText::new(text)))?;
        Ok(())
    }

    pub(crate) fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[macro_export]
macro_rules! match_xml_events {
    ($reader:expr => { $($arms:tt)* }) => {
        while let Some(result) = $reader.next()? {
            match result {
                Event::Eof => break,
                $($arms)*
                _ => (),
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn resolves_references() {
        let mut reader = XmlReader::new(Cursor::new(b"<t>a&amp;b&#233;&#x41;</t>".to_vec()));
        let mut text = String::new();
        while let Some(event) = reader.next().unwrap() {
            match event {
                Event::Text(event) => text.push_str(&event.xml_content().unwrap()),
                Event::GeneralRef(event) => text.push_bytes_ref(&event).unwrap(),
                _ => (),
            }
        }
        assert_eq!(text, "a&béA");
    }

    #[test]
    fn reads_attributes() {
        let mut reader = XmlReader::new(Cursor::new(br#"<c r="B2" t="s"/>"#.to_vec()));
        let mut reference = None;
        while let Some(event) = reader.next().unwrap() {
            if let Event::Start(event) = event {
                reference = event.get_attribute_value("r").unwrap().map(|value| value.to_string());
                assert!(event.get_attribute_value("missing").unwrap().is_none());
            }
        }
        assert_eq!(reference.as_deref(), Some("B2"));
    }

    #[test]
    fn writer_escapes_text() {
        let mut writer = XmlWriter::new(Vec::new()).unwrap();
        writer.start("t", &[("xml:space", "preserve")]).unwrap();
        writer.text("a < b & c").unwrap();
        writer.end("t").unwrap();
        writer.empty("br", &[]).unwrap();
        let xml = String::from_utf8(writer.into_inner()).unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>"));
        assert!(xml.ends_with("<t xml:space=\"preserve\">a &lt; b &amp; c</t><br/>"));
    }
}

//! XML deserialization of response bodies.

use oos_model::{CompleteMultipartUploadResult, CopyPartResult, ErrorBody, InitiateMultipartUploadResult};
use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::XmlError;

/// Trait for deserializing types from XML.
///
/// The root element has already been consumed by the caller; the
/// implementation reads child elements until the matching end tag.
pub trait XmlDeserialize: Sized {
    /// Deserialize an instance from the given XML reader, positioned just after
    /// the opening tag of this element.
    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError>;
}

/// Deserialize an XML document into a typed value.
///
/// Finds the root element and delegates to the type's [`XmlDeserialize`]
/// implementation.
///
/// # Examples
///
/// ```
/// use oos_model::InitiateMultipartUploadResult;
/// use oos_xml::from_xml;
///
/// let xml = br#"<InitiateMultipartUploadResult>
///   <Bucket>b</Bucket><Key>k</Key><UploadId>u-1</UploadId>
/// </InitiateMultipartUploadResult>"#;
/// let result: InitiateMultipartUploadResult = from_xml(xml).unwrap();
/// assert_eq!(result.upload_id, "u-1");
/// ```
pub fn from_xml<T: XmlDeserialize>(xml: &[u8]) -> Result<T, XmlError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event()? {
            Event::Start(_) => return T::deserialize_xml(&mut reader),
            Event::Eof => return Err(XmlError::MissingElement("root element".to_owned())),
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Helper functions for reading common XML patterns
// ---------------------------------------------------------------------------

/// Read the text content of the current element and consume its end tag.
///
/// Entity references (`&quot;` around ETags) arrive as separate events and are
/// resolved in place.
fn read_text_content(reader: &mut Reader<&[u8]>) -> Result<String, XmlError> {
    let mut text = String::new();
    loop {
        match reader.read_event()? {
            Event::Text(e) => {
                let decoded = e
                    .decode()
                    .map_err(|err| XmlError::ParseError(err.to_string()))?;
                let unescaped = quick_xml::escape::unescape(&decoded)
                    .map_err(|err| XmlError::ParseError(err.to_string()))?;
                text.push_str(&unescaped);
            }
            Event::CData(e) => {
                let decoded = e
                    .decode()
                    .map_err(|err| XmlError::ParseError(err.to_string()))?;
                text.push_str(&decoded);
            }
            Event::GeneralRef(e) => {
                if let Some(ch) = e
                    .resolve_char_ref()
                    .map_err(|err| XmlError::ParseError(err.to_string()))?
                {
                    text.push(ch);
                } else {
                    let name = e
                        .decode()
                        .map_err(|err| XmlError::ParseError(err.to_string()))?;
                    let resolved = quick_xml::escape::resolve_predefined_entity(&name)
                        .ok_or_else(|| XmlError::ParseError(format!("unknown entity &{name};")))?;
                    text.push_str(resolved);
                }
            }
            Event::End(_) => return Ok(text),
            Event::Eof => {
                return Err(XmlError::UnexpectedElement(
                    "unexpected EOF while reading text content".to_owned(),
                ));
            }
            _ => {}
        }
    }
}

/// Skip over an element and all its children.
fn skip_element(reader: &mut Reader<&[u8]>) -> Result<(), XmlError> {
    let mut depth: u32 = 1;
    loop {
        match reader.read_event()? {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
            Event::Eof => {
                return Err(XmlError::UnexpectedElement(
                    "unexpected EOF while skipping element".to_owned(),
                ));
            }
            _ => {}
        }
    }
}

/// Parse an ISO 8601 timestamp from XML text.
fn parse_timestamp(s: &str) -> Result<chrono::DateTime<chrono::Utc>, XmlError> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.fZ")
                .map(|ndt| ndt.and_utc())
        })
        .map_err(|e| XmlError::ParseError(format!("invalid timestamp '{s}': {e}")))
}

/// Walk the children of the current element, handing each text child to
/// `on_field`. Unknown nested elements are skipped.
fn read_fields(
    reader: &mut Reader<&[u8]>,
    element: &str,
    mut on_field: impl FnMut(&str, String) -> Result<(), XmlError>,
) -> Result<(), XmlError> {
    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.name();
                let tag_name = std::str::from_utf8(name.as_ref())
                    .map_err(|e| XmlError::ParseError(e.to_string()))?
                    .to_owned();
                let value = read_text_content(reader);
                match value {
                    Ok(value) => on_field(&tag_name, value)?,
                    Err(XmlError::UnexpectedElement(_)) => skip_element(reader)?,
                    Err(err) => return Err(err),
                }
            }
            Event::End(_) => return Ok(()),
            Event::Eof => {
                return Err(XmlError::UnexpectedElement(format!(
                    "unexpected EOF in {element}"
                )));
            }
            _ => {}
        }
    }
}

impl XmlDeserialize for InitiateMultipartUploadResult {
    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError> {
        let mut result = Self::default();
        read_fields(reader, "InitiateMultipartUploadResult", |tag, value| {
            match tag {
                "Bucket" => result.bucket = value,
                "Key" => result.key = value,
                "UploadId" => result.upload_id = value,
                _ => {}
            }
            Ok(())
        })?;

        if result.upload_id.is_empty() {
            return Err(XmlError::MissingElement("UploadId".to_owned()));
        }
        Ok(result)
    }
}

impl XmlDeserialize for CopyPartResult {
    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError> {
        let mut result = Self::default();
        read_fields(reader, "CopyPartResult", |tag, value| {
            match tag {
                "ETag" => result.etag = value,
                "LastModified" => result.last_modified = Some(parse_timestamp(&value)?),
                _ => {}
            }
            Ok(())
        })?;

        if result.etag.is_empty() {
            return Err(XmlError::MissingElement("ETag".to_owned()));
        }
        Ok(result)
    }
}

impl XmlDeserialize for CompleteMultipartUploadResult {
    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError> {
        let mut result = Self::default();
        read_fields(reader, "CompleteMultipartUploadResult", |tag, value| {
            match tag {
                "Location" => result.location = value,
                "Bucket" => result.bucket = value,
                "Key" => result.key = value,
                "ETag" => result.etag = value,
                _ => {}
            }
            Ok(())
        })?;
        Ok(result)
    }
}

impl XmlDeserialize for ErrorBody {
    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError> {
        let mut body = Self::default();
        read_fields(reader, "Error", |tag, value| {
            match tag {
                "Code" => body.code = value,
                "Message" => body.message = value,
                "RequestId" => body.request_id = value,
                "HostId" => body.host_id = value,
                "Resource" => body.resource = value,
                _ => {}
            }
            Ok(())
        })?;

        if body.code.is_empty() {
            return Err(XmlError::MissingElement("Code".to_owned()));
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_parse_error_document() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8"?>
<Error>
  <Code>NoSuchKey</Code>
  <Message>The specified key does not exist.</Message>
  <Resource>/bucket/missing.txt</Resource>
  <RequestId>4442587FB7D0A2F9</RequestId>
  <HostId>host-1</HostId>
</Error>"#;
        let body: ErrorBody = from_xml(xml).unwrap();
        assert_eq!(body.code, "NoSuchKey");
        assert_eq!(body.message, "The specified key does not exist.");
        assert_eq!(body.resource, "/bucket/missing.txt");
        assert_eq!(body.request_id, "4442587FB7D0A2F9");
        assert_eq!(body.host_id, "host-1");
    }

    #[test]
    fn test_should_reject_error_document_without_code() {
        let result: Result<ErrorBody, _> = from_xml(b"<Error><Message>x</Message></Error>");
        assert!(matches!(result, Err(XmlError::MissingElement(_))));
    }

    #[test]
    fn test_should_reject_non_xml_body() {
        let result: Result<ErrorBody, _> = from_xml(b"<html><body>Bad gateway");
        assert!(result.is_err());
    }

    #[test]
    fn test_should_resolve_quoted_etag_in_copy_part_result() {
        let xml = br#"<CopyPartResult>
  <LastModified>2024-03-01T12:30:05.000Z</LastModified>
  <ETag>&quot;b54357faf0632cce46e942fa68356b38&quot;</ETag>
</CopyPartResult>"#;
        let result: CopyPartResult = from_xml(xml).unwrap();
        assert_eq!(result.etag, "\"b54357faf0632cce46e942fa68356b38\"");
        assert!(result.last_modified.is_some());
    }

    #[test]
    fn test_should_parse_complete_result_and_skip_unknown_elements() {
        let xml = br#"<CompleteMultipartUploadResult>
  <Location>http://oos-cn.ctyunapi.cn/b/k</Location>
  <Bucket>b</Bucket>
  <Key>k</Key>
  <Extra><Nested>1</Nested></Extra>
  <ETag>"3858f62230ac3c915f300c664312c11f-9"</ETag>
</CompleteMultipartUploadResult>"#;
        let result: CompleteMultipartUploadResult = from_xml(xml).unwrap();
        assert_eq!(result.bucket, "b");
        assert_eq!(result.etag, "\"3858f62230ac3c915f300c664312c11f-9\"");
    }

    #[test]
    fn test_should_require_upload_id() {
        let result: Result<InitiateMultipartUploadResult, _> =
            from_xml(b"<InitiateMultipartUploadResult><Bucket>b</Bucket></InitiateMultipartUploadResult>");
        assert!(result.is_err());
    }
}

use std::borrow::Cow;

use quick_xml::Reader;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};

use crate::error::ActionError;

const WRITE_API_HINT: &str =
    "Adding '$wgEnableWriteAPI = true;' to your MediaWiki's LocalSettings.php might remove this problem.";
const DELETE_RIGHT_HINT: &str = "Adding '$wgGroupPermissions['bot']['delete'] = true;' to your MediaWiki's LocalSettings.php might remove this problem.";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<XmlElement>,
    text: String,
}

impl XmlElement {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    pub fn children(&self) -> &[XmlElement] {
        &self.children
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|child| child.name == name)
    }

    pub fn find(&self, name: &str) -> Option<&XmlElement> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(name))
    }

    pub fn descendants(&self, name: &str) -> Vec<&XmlElement> {
        let mut found = Vec::new();
        self.collect_named(name, &mut found);
        found
    }

    fn collect_named<'a>(&'a self, name: &str, found: &mut Vec<&'a XmlElement>) {
        for child in &self.children {
            if child.name == name {
                found.push(child);
            } else {
                child.collect_named(name, found);
            }
        }
    }
}

pub fn parse_document(raw: &str) -> Result<XmlElement, ActionError> {
    if raw.trim().is_empty() {
        return Err(ActionError::parse("xml", "empty response body"));
    }

    let mut reader = Reader::from_str(raw);
    reader.config_mut().trim_text(true);
    let mut stack: Vec<XmlElement> = Vec::new();

    loop {
        let event = reader.read_event().map_err(|error| {
            ActionError::parse(
                "xml",
                format!("{error} at position {}", reader.buffer_position()),
            )
        })?;
        match event {
            Event::Start(start) => stack.push(open_element(&start)?),
            Event::Empty(start) => {
                let element = open_element(&start)?;
                if let Some(root) = attach(&mut stack, element) {
                    return Ok(root);
                }
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| ActionError::parse("xml", "unexpected closing tag"))?;
                if let Some(root) = attach(&mut stack, element) {
                    return Ok(root);
                }
            }
            Event::Text(text) => {
                let value = text
                    .unescape()
                    .map_err(|error| ActionError::parse("xml", error.to_string()))?;
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&value);
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current
                        .text
                        .push_str(&String::from_utf8_lossy(data.into_inner().as_ref()));
                }
            }
            Event::Eof => {
                return Err(ActionError::parse(
                    "xml",
                    if stack.is_empty() {
                        "no root element"
                    } else {
                        "unexpected end of document"
                    },
                ));
            }
            _ => {}
        }
    }
}

fn open_element(start: &BytesStart<'_>) -> Result<XmlElement, ActionError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attribute in start.attributes() {
        let attribute =
            attribute.map_err(|error| ActionError::parse("xml", error.to_string()))?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute
            .unescape_value()
            .map_err(|error| ActionError::parse("xml", error.to_string()))?
            .into_owned();
        attributes.push((key, value));
    }
    Ok(XmlElement {
        name,
        attributes,
        ..XmlElement::default()
    })
}

fn attach(stack: &mut [XmlElement], element: XmlElement) -> Option<XmlElement> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(element);
            None
        }
        None => Some(element),
    }
}

pub fn html_unescape(value: &str) -> Cow<'_, str> {
    if !value.contains('&') {
        return Cow::Borrowed(value);
    }
    match unescape(value) {
        Ok(decoded) => decoded,
        Err(_) => Cow::Borrowed(value),
    }
}

pub fn check_api_error(root: &XmlElement) -> Result<(), ActionError> {
    let Some(error) = root.child("error") else {
        return Ok(());
    };
    let code = error.attr("code").unwrap_or("unknown_error").to_string();
    let info = error.attr("info").unwrap_or("unknown info").to_string();
    let hint = remediation_hint(&code).map(ToString::to_string);
    tracing::warn!(%code, %info, "MediaWiki API reported an error");
    Err(ActionError::Business { code, info, hint })
}

pub fn parse_api_response(raw: &str, context: &str) -> Result<XmlElement, ActionError> {
    if raw.starts_with("unknown_action:") {
        return Err(ActionError::Business {
            code: "unknown_action".to_string(),
            info: raw.lines().next().unwrap_or(raw).to_string(),
            hint: Some(WRITE_API_HINT.to_string()),
        });
    }
    let root = parse_document(raw).map_err(|error| match error {
        ActionError::ProtocolParse { message, .. } => ActionError::parse(context, message),
        other => other,
    })?;
    check_api_error(&root)?;
    Ok(root)
}

fn remediation_hint(code: &str) -> Option<&'static str> {
    match code {
        "permissiondenied" | "inpermissiondenied" | "cantdelete" => Some(DELETE_RIGHT_HINT),
        "unknown_action" | "writeapidenied" | "noapiwrite" => Some(WRITE_API_HINT),
        _ => None,
    }
}

pub(crate) fn delete_right_hint() -> &'static str {
    DELETE_RIGHT_HINT
}

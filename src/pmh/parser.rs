//! Streaming parser for OAI-PMH list responses.
//!
//! Events from a namespace-aware pull reader are pushed into a small handler
//! state machine. Protocol elements are only recognized in the OAI-PMH
//! namespace (or in no namespace, for sloppy servers); everything inside a
//! record's `<metadata>` or a set's `<setDescription>` is payload, whose leaf
//! nodes are handed to an [`ElementTransformer`].

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;

use crate::error::{AppError, Result};
use crate::models::{Element, PmhRecord, PmhSet, UNKNOWN_COUNT};
use crate::pmh::transform::{ElementTransformer, XmlNode};

pub const OAI_NAMESPACE: &[u8] = b"http://www.openarchives.org/OAI/2.0/";

/// Protocol error codes that just mean "the list is empty".
const EMPTY_LIST_CODES: [&str; 2] = ["noRecordsMatch", "noSetHierarchy"];

/// One page of a list response.
#[derive(Debug, Clone, PartialEq)]
pub struct PmhPage<T> {
    pub items: Vec<T>,
    /// Token for the next page; `None` on the last page
    pub resumption_token: Option<String>,
    /// `completeListSize` attribute of the resumption token, if given
    pub complete_list_size: Option<i64>,
}

impl<T> PmhPage<T> {
    fn empty() -> Self {
        Self {
            items: Vec::new(),
            resumption_token: None,
            complete_list_size: Some(0),
        }
    }

    /// Size of the whole list as far as this page can tell.
    ///
    /// Uses `completeListSize` when present. An unpaginated response is its
    /// own complete list; otherwise the size is unknown.
    pub fn list_size(&self) -> i64 {
        match (self.complete_list_size, &self.resumption_token) {
            (Some(size), _) => size,
            (None, None) => self.items.len() as i64,
            (None, Some(_)) => UNKNOWN_COUNT,
        }
    }
}

/// Parse a `ListRecords` (or `GetRecord`) response.
pub fn parse_records(
    xml: &[u8],
    transformer: &dyn ElementTransformer,
) -> Result<PmhPage<PmhRecord>> {
    let mut handler = parse(xml, transformer)?;
    if let Some(page) = handler.protocol_error()? {
        return Ok(page);
    }
    Ok(PmhPage {
        items: handler.records,
        resumption_token: handler.token,
        complete_list_size: handler.complete_list_size,
    })
}

/// Parse a `ListSets` response.
pub fn parse_sets(xml: &[u8], transformer: &dyn ElementTransformer) -> Result<PmhPage<PmhSet>> {
    let mut handler = parse(xml, transformer)?;
    if let Some(page) = handler.protocol_error()? {
        return Ok(page);
    }
    Ok(PmhPage {
        items: handler.sets,
        resumption_token: handler.token,
        complete_list_size: handler.complete_list_size,
    })
}

fn parse<'t>(xml: &[u8], transformer: &'t dyn ElementTransformer) -> Result<Handler<'t>> {
    let mut reader = NsReader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut handler = Handler::new(transformer);
    let mut buf = Vec::new();

    loop {
        let (ns, event) = reader.read_resolved_event_into(&mut buf)?;
        let protocol = in_protocol_namespace(&ns);

        match event {
            Event::Start(e) => handler.start(&e, protocol),
            Event::Empty(e) => {
                handler.start(&e, protocol);
                handler.end(e.local_name().as_ref(), protocol);
            }
            Event::End(e) => handler.end(e.local_name().as_ref(), protocol),
            Event::Text(e) => handler.text(&e.unescape()?),
            Event::CData(e) => handler.text(&String::from_utf8_lossy(&e.into_inner())),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(handler)
}

fn in_protocol_namespace(ns: &ResolveResult) -> bool {
    match ns {
        ResolveResult::Bound(Namespace(ns)) => *ns == OAI_NAMESPACE,
        ResolveResult::Unbound => true,
        ResolveResult::Unknown(_) => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Identifier,
    Datestamp,
    SetSpec,
    SetName,
    ResumptionToken,
    Error,
}

#[derive(Debug)]
struct OpenNode {
    node: XmlNode,
    has_children: bool,
}

struct Handler<'t> {
    transformer: &'t dyn ElementTransformer,
    depth: usize,
    /// Depth of the open `<metadata>` / `<setDescription>` element
    payload_depth: Option<usize>,
    nodes: Vec<OpenNode>,
    field: Option<Field>,
    text: String,
    in_header: bool,
    record: Option<PmhRecord>,
    set: Option<PmhSet>,
    records: Vec<PmhRecord>,
    sets: Vec<PmhSet>,
    token: Option<String>,
    complete_list_size: Option<i64>,
    error_code: String,
    error: Option<(String, String)>,
}

impl<'t> Handler<'t> {
    fn new(transformer: &'t dyn ElementTransformer) -> Self {
        Self {
            transformer,
            depth: 0,
            payload_depth: None,
            nodes: Vec::new(),
            field: None,
            text: String::new(),
            in_header: false,
            record: None,
            set: None,
            records: Vec::new(),
            sets: Vec::new(),
            token: None,
            complete_list_size: None,
            error_code: String::new(),
            error: None,
        }
    }

    fn start(&mut self, e: &BytesStart, protocol: bool) {
        self.depth += 1;

        if let Some(payload) = self.payload_depth {
            // The direct child of the payload is the format wrapper
            // (`oai_dc:dc`, `dim:dim`, ...); nodes start below it.
            if self.depth > payload + 1 {
                if let Some(parent) = self.nodes.last_mut() {
                    parent.has_children = true;
                }
                self.nodes.push(OpenNode {
                    node: xml_node(e),
                    has_children: false,
                });
            }
            return;
        }
        if !protocol {
            return;
        }

        match e.local_name().as_ref() {
            b"record" => self.record = Some(PmhRecord::default()),
            b"header" => {
                self.in_header = true;
                if let Some(record) = self.record.as_mut() {
                    record.deleted = attribute(e, "status").as_deref() == Some("deleted");
                }
            }
            b"identifier" if self.in_header => self.field = Some(Field::Identifier),
            b"datestamp" if self.in_header => self.field = Some(Field::Datestamp),
            b"setSpec" if self.in_header || self.set.is_some() => {
                self.field = Some(Field::SetSpec)
            }
            b"set" => self.set = Some(PmhSet::default()),
            b"setName" if self.set.is_some() => self.field = Some(Field::SetName),
            b"metadata" if self.record.is_some() => self.payload_depth = Some(self.depth),
            b"setDescription" if self.set.is_some() => self.payload_depth = Some(self.depth),
            b"resumptionToken" => {
                self.complete_list_size = attribute(e, "completeListSize")
                    .and_then(|size| size.trim().parse().ok());
                self.field = Some(Field::ResumptionToken);
            }
            b"error" => {
                self.error_code = attribute(e, "code").unwrap_or_default();
                self.field = Some(Field::Error);
            }
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        if self.payload_depth.is_some() {
            if let Some(open) = self.nodes.last_mut() {
                open.node.text.push_str(text);
            }
        } else if self.field.is_some() {
            self.text.push_str(text);
        }
    }

    fn end(&mut self, local_name: &[u8], protocol: bool) {
        let depth = self.depth;
        self.depth = self.depth.saturating_sub(1);

        if let Some(payload) = self.payload_depth {
            if depth > payload + 1 {
                if let Some(open) = self.nodes.pop() {
                    if !open.has_children {
                        if let Some(element) = self.transformer.transform(&open.node) {
                            self.push_element(element);
                        }
                    }
                }
            } else if depth == payload {
                self.payload_depth = None;
            }
            return;
        }

        if let Some(field) = self.field.take() {
            let value = std::mem::take(&mut self.text).trim().to_string();
            self.assign(field, value);
            return;
        }
        if !protocol {
            return;
        }

        match local_name {
            b"header" => self.in_header = false,
            b"record" => {
                if let Some(record) = self.record.take() {
                    self.records.push(record);
                }
            }
            b"set" => {
                if let Some(set) = self.set.take() {
                    self.sets.push(set);
                }
            }
            _ => {}
        }
    }

    fn assign(&mut self, field: Field, value: String) {
        match field {
            Field::Identifier => {
                if let Some(record) = self.record.as_mut() {
                    record.identifier = value;
                }
            }
            Field::Datestamp => {
                if let Some(record) = self.record.as_mut() {
                    record.datestamp = value;
                }
            }
            Field::SetSpec => {
                if let Some(set) = self.set.as_mut() {
                    set.spec = value;
                } else if let Some(record) = self.record.as_mut() {
                    // Records may belong to several sets; the first one wins.
                    if record.set_spec.is_none() && !value.is_empty() {
                        record.set_spec = Some(value);
                    }
                }
            }
            Field::SetName => {
                if let Some(set) = self.set.as_mut() {
                    set.name = value;
                }
            }
            Field::ResumptionToken => {
                self.token = (!value.is_empty()).then_some(value);
            }
            Field::Error => {
                if self.error.is_none() {
                    self.error = Some((std::mem::take(&mut self.error_code), value));
                }
            }
        }
    }

    fn push_element(&mut self, element: Element) {
        let elements = match (self.record.as_mut(), self.set.as_mut()) {
            (Some(record), _) => &mut record.elements,
            (None, Some(set)) => &mut set.elements,
            (None, None) => return,
        };
        if !elements.contains(&element) {
            elements.push(element);
        }
    }

    /// An empty page for "empty list" errors, `Err` for any other error.
    fn protocol_error<T>(&mut self) -> Result<Option<PmhPage<T>>> {
        match self.error.take() {
            None => Ok(None),
            Some((code, _)) if EMPTY_LIST_CODES.contains(&code.as_str()) => {
                Ok(Some(PmhPage::empty()))
            }
            Some((code, message)) => Err(AppError::pmh(code, message)),
        }
    }
}

fn xml_node(e: &BytesStart) -> XmlNode {
    XmlNode {
        name: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
        local_name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
        attributes: e
            .attributes()
            .flatten()
            .filter(|attr| !attr.key.as_ref().starts_with(b"xmlns"))
            .filter_map(|attr| {
                let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
                let value = attr.unescape_value().ok()?.into_owned();
                Some((key, value))
            })
            .collect(),
        text: String::new(),
    }
}

fn attribute(e: &BytesStart, local_name: &str) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == local_name.as_bytes())
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.into_owned()))
}

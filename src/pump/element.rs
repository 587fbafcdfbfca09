use quick_xml::events::BytesStart;

/// Owned parse of one target element, handed to transforms alongside its
/// verbatim source text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedElement {
    /// Qualified name as written, e.g. `Element` or `x:Element`
    pub name: String,
    /// Attributes in source order with unescaped values
    pub attributes: Vec<(String, String)>,
    pub children: Vec<ElementChild>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementChild {
    Element(ParsedElement),
    Text(String),
    CData(String),
}

impl ParsedElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn from_start(start: &BytesStart<'_>) -> Result<Self, quick_xml::Error> {
        let mut element = Self::new(String::from_utf8_lossy(start.name().as_ref()));
        for attr in start.attributes() {
            let attr = attr.map_err(quick_xml::Error::from)?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(quick_xml::Error::from)?
                .into_owned();
            element.attributes.push((key, value));
        }
        Ok(element)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &ParsedElement> {
        self.children.iter().filter_map(|child| match child {
            ElementChild::Element(element) => Some(element),
            _ => None,
        })
    }

    /// Concatenated text and CDATA content of this element and its descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                ElementChild::Element(element) => element.collect_text(out),
                ElementChild::Text(text) | ElementChild::CData(text) => out.push_str(text),
            }
        }
    }
}

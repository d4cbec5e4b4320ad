use crate::error::{Error, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    Has(String),
    Equals(String, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    axis: Axis,
    name: Option<String>,
    predicate: Option<Predicate>,
}

#[derive(Debug)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
}

impl Element {
    fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }
}

impl Step {
    fn parse(part: &str, axis: Axis) -> std::result::Result<Self, String> {
        let (name, predicate) = match part.split_once('[') {
            Some((name, rest)) => {
                let body = rest
                    .strip_suffix(']')
                    .ok_or_else(|| format!("unterminated predicate in '{part}'"))?;
                (name, Some(parse_predicate(body)?))
            }
            None => (part, None),
        };
        if name.is_empty() {
            return Err(format!("empty step in '{part}'"));
        }
        Ok(Step {
            axis,
            name: (name != "*").then(|| name.to_string()),
            predicate,
        })
    }

    fn accepts(&self, element: &Element) -> bool {
        if self.name.as_deref().is_some_and(|name| name != element.name) {
            return false;
        }
        match &self.predicate {
            None => true,
            Some(Predicate::Has(key)) => element.attribute(key).is_some(),
            Some(Predicate::Equals(key, value)) => element.attribute(key) == Some(value.as_str()),
        }
    }
}

fn parse_predicate(body: &str) -> std::result::Result<Predicate, String> {
    let body = body
        .trim()
        .strip_prefix('@')
        .ok_or_else(|| format!("only attribute predicates are supported, got '{body}'"))?;
    match body.split_once('=') {
        None => Ok(Predicate::Has(body.trim().to_string())),
        Some((key, value)) => {
            let value = value.trim();
            let unquoted = value
                .strip_prefix('\'')
                .and_then(|v| v.strip_suffix('\''))
                .or_else(|| value.strip_prefix('"').and_then(|v| v.strip_suffix('"')))
                .ok_or_else(|| format!("predicate value must be quoted, got '{value}'"))?;
            Ok(Predicate::Equals(key.trim().to_string(), unquoted.to_string()))
        }
    }
}

/// A compiled `step/step/@attribute` query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathQuery {
    steps: Vec<Step>,
    attribute: String,
}

impl PathQuery {
    pub fn parse(query: &str) -> Result<Self> {
        Self::parse_steps(query).map_err(|message| Error::Query {
            query: query.to_string(),
            message,
        })
    }

    fn parse_steps(query: &str) -> std::result::Result<Self, String> {
        let (rest, mut axis) = if let Some(rest) = query.strip_prefix("//") {
            (rest, Axis::Descendant)
        } else if let Some(rest) = query.strip_prefix('/') {
            (rest, Axis::Child)
        } else {
            (query, Axis::Descendant)
        };

        let mut steps = Vec::new();
        let mut parts = rest.split('/').peekable();
        while let Some(part) = parts.next() {
            if part.is_empty() {
                axis = Axis::Descendant;
                continue;
            }
            if let Some(attribute) = part.strip_prefix('@') {
                if parts.peek().is_some() {
                    return Err("the attribute must be the last step".to_string());
                }
                if steps.is_empty() {
                    return Err("no element steps before the attribute".to_string());
                }
                return Ok(PathQuery {
                    steps,
                    attribute: attribute.to_string(),
                });
            }
            steps.push(Step::parse(part, axis)?);
            axis = Axis::Child;
        }
        Err("the query must end in an @attribute step".to_string())
    }

    fn matches(&self, path: &[Element]) -> bool {
        matches_steps(&self.steps, path)
    }

    /// Values of the selected attribute on every matching element, in document order.
    pub fn select(&self, text: &str) -> Result<Vec<String>> {
        let mut reader = Reader::from_str(text);
        reader.trim_text(true);

        let mut path: Vec<Element> = Vec::new();
        let mut values = Vec::new();
        loop {
            let event = reader
                .read_event()
                .map_err(|err| Error::malformed(reader.buffer_position(), err))?;
            match event {
                Event::Start(tag) => {
                    path.push(read_element(&tag, reader.buffer_position())?);
                    self.collect(&path, &mut values);
                }
                Event::Empty(tag) => {
                    path.push(read_element(&tag, reader.buffer_position())?);
                    self.collect(&path, &mut values);
                    path.pop();
                }
                Event::End(_) => {
                    path.pop();
                }
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(values)
    }

    fn collect(&self, path: &[Element], values: &mut Vec<String>) {
        if !self.matches(path) {
            return;
        }
        if let Some(value) = path.last().and_then(|element| element.attribute(&self.attribute)) {
            values.push(value.to_string());
        }
    }
}

fn matches_steps(steps: &[Step], path: &[Element]) -> bool {
    let (Some((step, earlier_steps)), Some((element, ancestors))) =
        (steps.split_last(), path.split_last())
    else {
        return steps.is_empty() && path.is_empty();
    };
    if !step.accepts(element) {
        return false;
    }
    match step.axis {
        Axis::Child => matches_steps(earlier_steps, ancestors),
        Axis::Descendant => {
            (0..=ancestors.len()).any(|keep| matches_steps(earlier_steps, &ancestors[..keep]))
        }
    }
}

fn read_element(tag: &BytesStart<'_>, offset: usize) -> Result<Element> {
    let mut attributes = Vec::new();
    for attribute in tag.attributes() {
        let attribute = attribute.map_err(|err| Error::malformed(offset, err))?;
        let value = attribute
            .unescape_value()
            .map_err(|err| Error::malformed(offset, err))?;
        attributes.push((
            String::from_utf8_lossy(attribute.key.as_ref()).into_owned(),
            value.into_owned(),
        ));
    }
    Ok(Element {
        name: String::from_utf8_lossy(tag.name().as_ref()).into_owned(),
        attributes,
    })
}
